//! Modal progress overlay shown while the first scan runs.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph};
use ratatui::Frame;

use crate::tui::app::App;
use crate::tui::theme::current_theme;

pub fn render(frame: &mut Frame, app: &App) {
    let theme = current_theme();
    let area = centered_rect(52, 7, frame.area());

    frame.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.popup_title)
        .title(" Loading ")
        .style(theme.popup);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner);

    let label = format!(" Scanning {} emails...", app.total);
    frame.render_widget(Paragraph::new(Line::from(Span::styled(label, theme.popup))), rows[0]);

    let gauge = Gauge::default()
        .gauge_style(theme.gauge)
        .percent(u16::from(app.progress.min(100)))
        .label(format!("{}% ({} loaded)", app.progress, app.index.len()));
    frame.render_widget(gauge, rows[2]);

    let hint = Line::from(vec![
        Span::styled(" Esc", theme.search_prompt),
        Span::styled(": run in background  ", theme.dim),
        Span::styled("q", theme.search_prompt),
        Span::styled(": stop and quit", theme.dim),
    ]);
    frame.render_widget(Paragraph::new(hint), rows[3]);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    let x = area.x + area.width.saturating_sub(w) / 2;
    let y = area.y + area.height.saturating_sub(h) / 2;
    Rect::new(x, y, w, h)
}
