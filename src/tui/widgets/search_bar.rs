//! Search input bar shown at the bottom while typing a live filter.

use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::tui::app::App;
use crate::tui::theme::current_theme;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let theme = current_theme();

    let spans = vec![
        Span::styled(" Search: ", theme.search_prompt),
        Span::styled(app.search_query.clone(), theme.message_body),
        Span::styled("_", theme.search_prompt),
        Span::styled(
            format!("  ({} / {})", app.visible_count(), app.index.len()),
            theme.dim,
        ),
    ];

    let bar = Paragraph::new(Line::from(spans)).style(theme.status_bar);
    frame.render_widget(bar, area);
}
