//! Main render function that dispatches to widgets.

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::Frame;

use super::app::App;
use super::widgets;

/// Render the entire TUI frame.
pub fn render(frame: &mut Frame, app: &mut App) {
    let size = frame.area();

    // header (1) + content (flex) + status or search (1)
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(size);

    widgets::header_bar::render(frame, app, vertical[0]);

    let content_area = if app.show_sidebar {
        let h_split = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(22), Constraint::Min(30)])
            .split(vertical[1]);
        widgets::sidebar::render(frame, app, h_split[0]);
        h_split[1]
    } else {
        vertical[1]
    };

    let split = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(content_area);
    widgets::mail_list::render(frame, app, split[0]);
    widgets::mail_view::render(frame, app, split[1]);

    if app.search_active {
        widgets::search_bar::render(frame, app, vertical[2]);
    } else {
        widgets::status_bar::render(frame, app, vertical[2]);
    }

    if app.show_loading {
        widgets::loading_popup::render(frame, app);
    }
}
