//! Mail list widget: virtual-scrolling table over the display set.

use ratatui::layout::{Constraint, Rect};
use ratatui::widgets::{Block, Borders, Row, Table};
use ratatui::Frame;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::tui::app::{App, PanelFocus};
use crate::tui::theme::current_theme;

/// Render the message table. Only rows inside the viewport are copied out of
/// the index.
pub fn render(frame: &mut Frame, app: &mut App, area: Rect) {
    let theme = current_theme();

    let border_style = if app.focus == PanelFocus::MailList {
        theme.border_focused
    } else {
        theme.border
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(" Messages ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height < 2 {
        return;
    }

    // Header row takes 1 line, rest is data
    app.list_viewport_height = (inner.height as usize).saturating_sub(1);
    app.ensure_selected_visible();

    let date_w = 16u16;
    let sender_w = 28u16.min(inner.width / 3);
    let subject_w = inner.width.saturating_sub(date_w + sender_w + 2);

    let header = Row::new(vec!["Sender", "Subject", "Date"]).style(theme.list_header);

    let start = app.list_scroll_offset;
    let rows: Vec<Row> = app
        .visible_page()
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let style = if start + i == app.selected {
                theme.list_selected
            } else {
                theme.list_normal
            };
            Row::new(vec![
                truncate_str(&record.sender, sender_w as usize),
                truncate_str(&record.subject, subject_w as usize),
                truncate_str(&record.timestamp, date_w as usize),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(sender_w),
            Constraint::Min(subject_w),
            Constraint::Length(date_w),
        ],
    )
    .header(header)
    .column_spacing(1);

    frame.render_widget(table, inner);
}

/// Truncate to `max_width` display columns, ending with "..." when cut.
fn truncate_str(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width <= 3 {
        return s.chars().take(max_width).collect();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + w + 3 > max_width {
            break;
        }
        result.push(ch);
        width += w;
    }
    result.push_str("...");
    result
}
