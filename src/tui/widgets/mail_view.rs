//! Message pane: compact headers plus the rendered document as text.

use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::tui::app::{App, PanelFocus};
use crate::tui::theme::{current_theme, Theme};

pub fn render(frame: &mut Frame, app: &mut App, area: Rect) {
    let theme = current_theme();

    let border_style = if app.focus == PanelFocus::MailView {
        theme.border_focused
    } else {
        theme.border
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(" Message ");
    let inner = block.inner(area);
    app.message_view_height = inner.height as usize;
    frame.render_widget(block, area);

    let Some(record) = app.current_record() else {
        let text = if app.scanner.is_running() {
            "Loading..."
        } else {
            "No message selected"
        };
        frame.render_widget(Paragraph::new(text).style(theme.dim), inner);
        return;
    };

    let mut lines: Vec<Line> = Vec::new();
    for (label, value) in [
        ("Date:    ", record.timestamp.as_str()),
        ("From:    ", record.sender.as_str()),
        ("Subject: ", record.subject.as_str()),
        ("Folder:  ", record.folder.name()),
    ] {
        lines.push(Line::from(vec![
            Span::styled(label, theme.message_header_label),
            Span::styled(value.to_string(), theme.message_header_value),
        ]));
    }
    lines.push(Line::from(Span::styled(
        "\u{2500}".repeat(inner.width as usize),
        theme.border,
    )));

    if let Some(text) = &app.current_text {
        lines.extend(text.lines().map(|line| style_body_line(line, &theme)));
    }

    let max_scroll = lines.len().saturating_sub(inner.height as usize);
    app.message_scroll_offset = app.message_scroll_offset.min(max_scroll);

    let paragraph = Paragraph::new(lines)
        .scroll((app.message_scroll_offset as u16, 0))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, inner);
}

/// Style one body line, highlighting URLs.
fn style_body_line(line: &str, theme: &Theme) -> Line<'static> {
    let mut spans = Vec::new();
    let mut rest = line;
    while let Some(start) = find_url(rest) {
        if start > 0 {
            spans.push(Span::styled(rest[..start].to_string(), theme.message_body));
        }
        let url = &rest[start..];
        let len = url
            .find(|c: char| c.is_whitespace() || matches!(c, '>' | ')' | '"' | ']'))
            .unwrap_or(url.len());
        spans.push(Span::styled(url[..len].to_string(), theme.url));
        rest = &url[len..];
    }
    if !rest.is_empty() || spans.is_empty() {
        spans.push(Span::styled(rest.to_string(), theme.message_body));
    }
    Line::from(spans)
}

fn find_url(s: &str) -> Option<usize> {
    match (s.find("http://"), s.find("https://")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
