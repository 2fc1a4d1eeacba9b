//! Top header bar: file name, size, folder and message counts.

use humansize::{format_size, BINARY};
use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;
use unicode_width::UnicodeWidthStr;

use crate::tui::app::App;
use crate::tui::theme::current_theme;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let theme = current_theme();

    let file_name = app
        .mbox_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| app.mbox_path.to_string_lossy().to_string());
    let size = format_size(app.store.file_size(), BINARY);
    let criteria = app.index.criteria();

    let mut left = format!(
        " {file_name} ({size}) | {} | {} / {} messages",
        criteria.folder,
        app.visible_count(),
        app.index.len()
    );
    if !criteria.search.is_empty() && !app.search_active {
        left.push_str(&format!(" | search: \"{}\"", criteria.search));
    }

    let right = " /:search  L:folders  q:quit ";
    let used = UnicodeWidthStr::width(left.as_str()) + right.len();
    let padding = (area.width as usize).saturating_sub(used);

    let line = Line::from(vec![
        Span::styled(left, theme.header_bar),
        Span::styled(" ".repeat(padding), theme.header_bar),
        Span::styled(right, theme.header_bar),
    ]);
    frame.render_widget(Paragraph::new(line).style(theme.header_bar), area);
}
