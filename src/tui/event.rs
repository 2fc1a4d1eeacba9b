//! Keyboard and input event handling.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::app::{App, PanelFocus};

/// Process a key event and update the application state.
pub fn handle_key_event(app: &mut App, key: KeyEvent) -> anyhow::Result<()> {
    if (key.modifiers, key.code) == (KeyModifiers::CONTROL, KeyCode::Char('c')) {
        app.quit();
        return Ok(());
    }

    // ── Search bar input mode (captures all keys) ─────────
    if app.search_active {
        handle_search_input(app, key);
        return Ok(());
    }

    // ── Loading overlay ───────────────────────────────────
    if app.show_loading {
        match key.code {
            KeyCode::Esc => app.run_in_background(),
            KeyCode::Char('q') => app.quit(),
            _ => {}
        }
        return Ok(());
    }

    match key.code {
        KeyCode::Char('q') => {
            app.quit();
            return Ok(());
        }
        KeyCode::Tab => {
            app.focus = next_focus(app, true);
            return Ok(());
        }
        KeyCode::BackTab => {
            app.focus = next_focus(app, false);
            return Ok(());
        }
        KeyCode::Char('/') => {
            app.search_active = true;
            app.focus = PanelFocus::SearchBar;
            return Ok(());
        }
        KeyCode::Char('L') => {
            toggle_sidebar(app);
            return Ok(());
        }
        KeyCode::Char('r') => {
            app.reload();
            return Ok(());
        }
        _ => {}
    }

    match app.focus {
        PanelFocus::Sidebar => handle_sidebar_keys(app, key),
        PanelFocus::MailList => handle_mail_list_keys(app, key),
        PanelFocus::MailView => handle_mail_view_keys(app, key),
        PanelFocus::SearchBar => {}
    }
    Ok(())
}

fn next_focus(app: &App, forward: bool) -> PanelFocus {
    let order: &[PanelFocus] = if app.show_sidebar {
        &[PanelFocus::Sidebar, PanelFocus::MailList, PanelFocus::MailView]
    } else {
        &[PanelFocus::MailList, PanelFocus::MailView]
    };
    let pos = order.iter().position(|&f| f == app.focus).unwrap_or(0);
    let next = if forward {
        (pos + 1) % order.len()
    } else {
        (pos + order.len() - 1) % order.len()
    };
    order[next]
}

fn toggle_sidebar(app: &mut App) {
    if !app.show_sidebar {
        app.show_sidebar = true;
        app.focus = PanelFocus::Sidebar;
    } else if app.focus == PanelFocus::Sidebar {
        app.show_sidebar = false;
        app.focus = PanelFocus::MailList;
    } else {
        app.focus = PanelFocus::Sidebar;
    }
}

fn handle_search_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.search_active = false;
            app.focus = PanelFocus::MailList;
            if !app.search_query.is_empty() {
                app.search_query.clear();
                app.update_search();
            }
        }
        KeyCode::Enter => {
            app.search_active = false;
            app.focus = PanelFocus::MailList;
        }
        KeyCode::Backspace => {
            if app.search_query.pop().is_some() {
                app.update_search();
            }
        }
        KeyCode::Char(c) => {
            app.search_query.push(c);
            app.update_search();
        }
        _ => {}
    }
}

fn handle_sidebar_keys(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            if app.sidebar_selected + 1 < app.sidebar.len() {
                app.sidebar_selected += 1;
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.sidebar_selected = app.sidebar_selected.saturating_sub(1);
        }
        KeyCode::Enter => {
            app.apply_sidebar_selection();
            app.focus = PanelFocus::MailList;
        }
        KeyCode::Esc => app.focus = PanelFocus::MailList,
        _ => {}
    }
}

fn handle_mail_list_keys(app: &mut App, key: KeyEvent) {
    let last = app.visible_count().saturating_sub(1);
    let page = app.list_viewport_height.max(1);
    let target = match key.code {
        KeyCode::Char('j') | KeyCode::Down => (app.selected + 1).min(last),
        KeyCode::Char('k') | KeyCode::Up => app.selected.saturating_sub(1),
        KeyCode::Char('g') | KeyCode::Home => 0,
        KeyCode::Char('G') | KeyCode::End => last,
        KeyCode::PageDown => (app.selected + page).min(last),
        KeyCode::PageUp => app.selected.saturating_sub(page),
        KeyCode::Enter => {
            app.focus = PanelFocus::MailView;
            return;
        }
        _ => return,
    };
    if target != app.selected || app.current_key.is_none() {
        app.select_message(target);
    }
    app.ensure_selected_visible();
}

fn handle_mail_view_keys(app: &mut App, key: KeyEvent) {
    let page = app.message_view_height.max(1);
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.message_scroll_offset += 1,
        KeyCode::Char('k') | KeyCode::Up => {
            app.message_scroll_offset = app.message_scroll_offset.saturating_sub(1)
        }
        KeyCode::PageDown | KeyCode::Char(' ') => app.message_scroll_offset += page,
        KeyCode::PageUp => app.message_scroll_offset = app.message_scroll_offset.saturating_sub(page),
        KeyCode::Char('g') | KeyCode::Home => app.message_scroll_offset = 0,
        KeyCode::Esc => app.focus = PanelFocus::MailList,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::io::Write;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app_with(n: usize) -> (tempfile::NamedTempFile, App) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..n {
            write!(
                f,
                "From u{i}@x Mon Jan 01 00:00:00 2024\nFrom: sender{i}@example.com\nSubject: topic {i}\n\nbody\n\n"
            )
            .unwrap();
        }
        f.flush().unwrap();
        let mut app = App::open(f.path(), &Config::default()).unwrap();
        app.scanner.wait();
        app.tick();
        (f, app)
    }

    #[test]
    fn test_typing_filters_live() {
        let (_tmp, mut app) = app_with(20);
        handle_key_event(&mut app, key(KeyCode::Char('/'))).unwrap();
        assert!(app.search_active);
        for c in "topic 1".chars() {
            handle_key_event(&mut app, key(KeyCode::Char(c))).unwrap();
        }
        // topic 1, topic 10..19
        assert_eq!(app.visible_count(), 11);

        handle_key_event(&mut app, key(KeyCode::Esc)).unwrap();
        assert!(!app.search_active);
        assert_eq!(app.visible_count(), 20);
    }

    #[test]
    fn test_list_navigation_clamps() {
        let (_tmp, mut app) = app_with(3);
        handle_key_event(&mut app, key(KeyCode::Char('G'))).unwrap();
        assert_eq!(app.selected, 2);
        handle_key_event(&mut app, key(KeyCode::Down)).unwrap();
        assert_eq!(app.selected, 2);
        handle_key_event(&mut app, key(KeyCode::Home)).unwrap();
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn test_q_quits() {
        let (_tmp, mut app) = app_with(2);
        handle_key_event(&mut app, key(KeyCode::Char('q'))).unwrap();
        assert!(app.should_quit);
    }

    #[test]
    fn test_focus_cycle_skips_hidden_sidebar() {
        let (_tmp, mut app) = app_with(1);
        app.show_sidebar = false;
        app.focus = PanelFocus::MailView;
        handle_key_event(&mut app, key(KeyCode::Tab)).unwrap();
        assert_eq!(app.focus, PanelFocus::MailList);
    }
}
