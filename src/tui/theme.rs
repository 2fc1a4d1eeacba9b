//! Color theme for the TUI.

use ratatui::style::{Color, Modifier, Style};

pub struct Theme {
    pub header_bar: Style,
    pub status_bar: Style,
    pub list_selected: Style,
    pub list_header: Style,
    pub list_normal: Style,
    pub sidebar: Style,
    pub sidebar_selected: Style,
    pub message_header_label: Style,
    pub message_header_value: Style,
    pub message_body: Style,
    pub url: Style,
    pub border: Style,
    pub border_focused: Style,
    pub popup: Style,
    pub popup_title: Style,
    pub gauge: Style,
    pub search_prompt: Style,
    pub dim: Style,
}

impl Theme {
    /// Dark theme (default).
    pub fn dark() -> Self {
        let base_bg = Color::Rgb(30, 30, 46);
        let text = Color::Rgb(220, 220, 230);
        let border = Style::default().fg(Color::Rgb(80, 80, 100));
        Self {
            header_bar: Style::default().fg(Color::Rgb(200, 200, 220)).bg(base_bg),
            status_bar: Style::default().fg(Color::Rgb(150, 150, 170)).bg(base_bg),
            list_selected: Style::default().fg(Color::White).bg(Color::Rgb(60, 60, 100)),
            list_header: Style::default()
                .fg(Color::Rgb(180, 180, 200))
                .bg(Color::Rgb(40, 40, 60))
                .add_modifier(Modifier::BOLD),
            list_normal: Style::default().fg(Color::Rgb(200, 200, 220)),
            sidebar: Style::default().fg(Color::Rgb(180, 180, 200)),
            sidebar_selected: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            message_header_label: Style::default()
                .fg(Color::Rgb(130, 170, 255))
                .add_modifier(Modifier::BOLD),
            message_header_value: Style::default().fg(text),
            message_body: Style::default().fg(text),
            url: Style::default().fg(Color::Cyan).add_modifier(Modifier::UNDERLINED),
            border,
            border_focused: border.fg(Color::Rgb(130, 170, 255)).add_modifier(Modifier::BOLD),
            popup: Style::default().fg(text).bg(Color::Rgb(20, 20, 35)),
            popup_title: Style::default()
                .fg(Color::Rgb(130, 170, 255))
                .add_modifier(Modifier::BOLD),
            gauge: Style::default().fg(Color::Rgb(130, 170, 255)).bg(Color::Rgb(40, 40, 60)),
            search_prompt: Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            dim: Style::default().fg(Color::Rgb(110, 110, 130)),
        }
    }
}

/// Return the active theme.
pub fn current_theme() -> Theme {
    Theme::dark()
}
