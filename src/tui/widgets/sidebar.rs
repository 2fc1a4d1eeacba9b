//! Folder sidebar: "All" plus every folder that has messages.

use ratatui::layout::Rect;
use ratatui::style::Modifier;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::tui::app::{App, PanelFocus};
use crate::tui::theme::current_theme;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let theme = current_theme();

    let is_focused = app.focus == PanelFocus::Sidebar;
    let border_style = if is_focused {
        theme.border_focused
    } else {
        theme.border
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(" Folders ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height < 1 || inner.width < 4 {
        return;
    }

    let active = app.index.criteria().folder;
    let width = inner.width as usize;
    let lines: Vec<Line> = app
        .sidebar
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let style = if i == app.sidebar_selected && is_focused {
                theme.sidebar_selected
            } else if entry.filter == active {
                theme.sidebar_selected.remove_modifier(Modifier::BOLD)
            } else {
                theme.sidebar
            };
            let text = sidebar_entry(&entry.filter.to_string(), entry.count, width);
            Line::from(Span::styled(text, style))
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

/// Format an entry as ` Name (123)`, cutting the name if it does not fit.
fn sidebar_entry(name: &str, count: usize, width: usize) -> String {
    let count_str = format!(" ({count})");
    let avail = width.saturating_sub(count_str.len() + 1);
    let name: String = name.chars().take(avail).collect();
    format!(" {name}{count_str}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidebar_entry() {
        assert_eq!(sidebar_entry("All", 12, 20), " All (12)");
        assert_eq!(sidebar_entry("Archived", 3, 10), " Archi (3)");
    }
}
