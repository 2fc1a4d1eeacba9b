//! Bottom status bar: scan status or transient messages, plus progress.

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::scan::ScanState;
use crate::tui::app::{App, PanelFocus};
use crate::tui::theme::current_theme;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let theme = current_theme();

    let right_text = match app.scan_state() {
        ScanState::Scanning => format!("{}%  v{VERSION} ", app.progress),
        _ => format!("v{VERSION} "),
    };

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(right_text.len() as u16),
        ])
        .split(area);

    let content = match &app.status_message {
        Some((msg, _, _)) => Line::from(Span::styled(format!(" {msg}"), theme.status_bar)),
        None => {
            let mut spans = Vec::new();
            for (key, desc) in build_hints(app.focus) {
                spans.push(Span::styled(format!(" {key}"), theme.search_prompt));
                spans.push(Span::styled(format!(":{desc}"), theme.status_bar));
            }
            Line::from(spans)
        }
    };
    frame.render_widget(Paragraph::new(content).style(theme.status_bar), chunks[0]);

    let right = Paragraph::new(Line::from(Span::styled(right_text, theme.dim)))
        .alignment(Alignment::Right)
        .style(theme.status_bar);
    frame.render_widget(right, chunks[1]);
}

fn build_hints(focus: PanelFocus) -> Vec<(&'static str, &'static str)> {
    let mut hints = Vec::new();

    match focus {
        PanelFocus::Sidebar => {
            hints.push(("j/k", "move"));
            hints.push(("Enter", "view folder"));
            hints.push(("Esc", "back"));
            hints.push(("Tab", "panel"));
            hints.push(("q", "quit"));
        }
        PanelFocus::MailList => {
            hints.push(("j/k", "move"));
            hints.push(("Enter", "read"));
            hints.push(("/", "search"));
            hints.push(("r", "reload"));
            hints.push(("Tab", "panel"));
            hints.push(("q", "quit"));
        }
        PanelFocus::MailView => {
            hints.push(("j/k", "scroll"));
            hints.push(("Esc", "back"));
            hints.push(("Tab", "panel"));
            hints.push(("q", "quit"));
        }
        PanelFocus::SearchBar => {
            hints.push(("Enter", "keep"));
            hints.push(("Esc", "clear"));
        }
    }

    hints
}
