//! Global application state for the TUI (the "Model" in Elm architecture).

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;

use crate::config::Config;
use crate::error::Result;
use crate::index::{FilterCriteria, FilterUpdate, FolderFilter, LiveIndex};
use crate::model::record::{HeaderRecord, MessageKey};
use crate::render;
use crate::scan::{ScanCoordinator, ScanEvent, ScanState};
use crate::store::archive::ArchiveStore;

/// Scan events handled per tick; the rest wait for the next one.
const EVENTS_PER_TICK: usize = 256;

/// Which panel currently has keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelFocus {
    Sidebar,
    MailList,
    MailView,
    SearchBar,
}

/// One line of the folder sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidebarEntry {
    pub filter: FolderFilter,
    pub count: usize,
}

/// Complete TUI state.
pub struct App {
    // ── Data ──────────────────────────────────
    pub mbox_path: PathBuf,
    pub store: Arc<ArchiveStore>,
    pub index: Arc<LiveIndex>,
    pub scanner: ScanCoordinator,
    events: Option<Receiver<ScanEvent>>,
    /// Message count reported by the boundary walk.
    pub total: usize,
    /// Last progress percentage received.
    pub progress: u8,

    // ── Navigation ────────────────────────────
    /// Selected row of the display set.
    pub selected: usize,
    pub list_scroll_offset: usize,
    pub message_scroll_offset: usize,
    /// Cached viewport heights (set during render).
    pub list_viewport_height: usize,
    pub message_view_height: usize,

    // ── Sidebar ───────────────────────────────
    pub show_sidebar: bool,
    pub sidebar: Vec<SidebarEntry>,
    pub sidebar_selected: usize,

    // ── UI state ──────────────────────────────
    pub focus: PanelFocus,
    /// Modal progress overlay shown while the scan runs; Esc hides it.
    pub show_loading: bool,
    pub search_active: bool,
    pub search_query: String,

    // ── Loaded message ────────────────────────
    pub current_key: Option<MessageKey>,
    /// Rendered document of `current_key`, converted to text.
    pub current_text: Option<String>,
    render_cache: LruCache<MessageKey, String>,

    // ── Lifecycle ─────────────────────────────
    pub should_quit: bool,
    /// Status message and the instant it was set. Scan status texts persist
    /// until replaced; others clear after a few seconds.
    pub status_message: Option<(String, Instant, bool)>,
}

impl App {
    /// Open `path` and start the background scan.
    ///
    /// Fails before any UI exists if the archive cannot be opened.
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        let folder = config
            .general
            .default_folder
            .parse::<FolderFilter>()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Invalid default folder, using Inbox");
                FolderFilter::default()
            });
        let index = Arc::new(LiveIndex::with_criteria(FilterCriteria {
            folder,
            search: String::new(),
        }));

        let cache_size = NonZeroUsize::new(config.display.render_cache_size)
            .unwrap_or(NonZeroUsize::MIN);

        let mut app = Self {
            mbox_path: path.to_path_buf(),
            store: Arc::new(ArchiveStore::new(&config.performance)),
            index,
            scanner: ScanCoordinator::new(config.scan.batch_size),
            events: None,
            total: 0,
            progress: 0,
            selected: 0,
            list_scroll_offset: 0,
            message_scroll_offset: 0,
            list_viewport_height: 20,
            message_view_height: 20,
            show_sidebar: config.display.show_sidebar,
            sidebar: Vec::new(),
            sidebar_selected: 0,
            focus: PanelFocus::MailList,
            show_loading: false,
            search_active: false,
            search_query: String::new(),
            current_key: None,
            current_text: None,
            render_cache: LruCache::new(cache_size),
            should_quit: false,
            status_message: None,
        };
        app.load(path)?;
        Ok(app)
    }

    /// Start a new load cycle for `path`.
    ///
    /// The running scan is stopped and joined before the store opens the new
    /// file, so no read of the old archive can follow. The search text is
    /// cleared; the folder filter is kept.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.scanner.cancel_and_wait();
        self.events = None;
        self.index.clear();
        self.search_active = false;
        self.search_query.clear();
        self.index.set_filter(FilterUpdate::search(String::new()));
        self.render_cache.clear();
        self.current_key = None;
        self.current_text = None;
        self.selected = 0;
        self.list_scroll_offset = 0;
        self.message_scroll_offset = 0;
        self.progress = 0;

        self.total = self.store.open(path)?;
        self.mbox_path = path.to_path_buf();
        self.show_loading = self.total > 0;
        self.refresh_sidebar();
        self.start_scan();
        Ok(())
    }

    /// Re-read the current archive from disk.
    pub fn reload(&mut self) {
        let path = self.mbox_path.clone();
        if let Err(e) = self.load(&path) {
            tracing::warn!(error = %e, "Reload failed");
            self.refresh_sidebar();
            self.set_status(&format!("Reload failed: {e}"));
        }
    }

    fn start_scan(&mut self) {
        let sink = Arc::clone(&self.index);
        let rx = self
            .scanner
            .start(Arc::clone(&self.store), self.total, sink);
        self.events = Some(rx);
        self.set_scan_status(format!("Scanning {} emails...", self.total));
    }

    /// Called every tick: drains scan events and clears expired status messages.
    pub fn tick(&mut self) {
        self.drain_scan_events();
        if let Some((_, when, sticky)) = &self.status_message {
            if !sticky && when.elapsed().as_secs() >= 5 {
                self.status_message = None;
            }
        }
    }

    fn drain_scan_events(&mut self) {
        let Some(rx) = &self.events else {
            return;
        };
        let mut pending = Vec::new();
        let mut disconnected = false;
        while pending.len() < EVENTS_PER_TICK {
            match rx.try_recv() {
                Ok(event) => pending.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            self.events = None;
        }

        let mut grew = false;
        for event in pending {
            match event {
                ScanEvent::Batch(_) => grew = true,
                ScanEvent::Progress(pct) => self.progress = pct,
                ScanEvent::Finished { processed, .. } => {
                    self.progress = 100;
                    self.show_loading = false;
                    self.set_scan_status(format!("Done. {processed} emails loaded."));
                }
                ScanEvent::Cancelled { processed } => {
                    self.show_loading = false;
                    self.set_scan_status(format!("Stopped. {processed} emails loaded."));
                }
            }
        }

        if grew {
            self.refresh_sidebar();
            if self.current_key.is_none() && self.visible_count() > 0 {
                self.select_message(self.selected);
            }
        }
    }

    /// Rebuild the sidebar from folder counts, keeping the active folder selected.
    pub fn refresh_sidebar(&mut self) {
        let counts = self.index.folder_counts();
        let active = self.index.criteria().folder;

        let mut entries = vec![SidebarEntry {
            filter: FolderFilter::All,
            count: counts.total(),
        }];
        entries.extend(counts.non_empty().into_iter().map(|(folder, count)| SidebarEntry {
            filter: FolderFilter::Only(folder),
            count,
        }));

        if let Some(pos) = entries.iter().position(|e| e.filter == active) {
            self.sidebar_selected = pos;
        } else {
            self.sidebar_selected = self.sidebar_selected.min(entries.len() - 1);
        }
        self.sidebar = entries;
    }

    /// Number of rows in the display set.
    pub fn visible_count(&self) -> usize {
        self.index.display_len()
    }

    /// Display rows currently inside the list viewport.
    pub fn visible_page(&self) -> Vec<HeaderRecord> {
        self.index
            .display_page(self.list_scroll_offset, self.list_viewport_height.max(1))
    }

    /// Record at the selected row, if any.
    pub fn current_record(&self) -> Option<HeaderRecord> {
        self.index.record_at(self.selected)
    }

    /// Select a display row and load its document.
    pub fn select_message(&mut self, row: usize) {
        if row >= self.visible_count() {
            return;
        }
        self.selected = row;
        self.message_scroll_offset = 0;
        self.load_selected();
    }

    fn load_selected(&mut self) {
        self.current_key = self.index.key_at(self.selected);
        self.current_text = self.current_key.map(|key| {
            if let Some(text) = self.render_cache.get(&key) {
                return text.clone();
            }
            let document = render::render_message(&self.store, key);
            let text = render::html_to_text(&document);
            self.render_cache.put(key, text.clone());
            text
        });
    }

    /// Apply the folder of the highlighted sidebar entry.
    pub fn apply_sidebar_selection(&mut self) {
        let Some(entry) = self.sidebar.get(self.sidebar_selected).copied() else {
            return;
        };
        self.index.set_filter(FilterUpdate::folder(entry.filter));
        self.after_filter_change();
        self.set_status(&format!("Viewing: {}", entry.filter));
    }

    /// Live search: every keystroke narrows the display set.
    pub fn update_search(&mut self) {
        self.index
            .set_filter(FilterUpdate::search(self.search_query.clone()));
        self.after_filter_change();
    }

    fn after_filter_change(&mut self) {
        self.selected = 0;
        self.list_scroll_offset = 0;
        if self.visible_count() > 0 {
            self.select_message(0);
        } else {
            self.current_key = None;
            self.current_text = None;
        }
    }

    /// Hide the loading overlay; the scan keeps running.
    pub fn run_in_background(&mut self) {
        self.show_loading = false;
        if self.scanner.is_running() {
            self.set_scan_status("Loading continuing in background...".to_string());
        }
    }

    /// Stop the scan (waiting for the worker) and request exit.
    pub fn quit(&mut self) {
        if self.scanner.is_running() {
            tracing::info!("Stopping scan before exit");
        }
        self.scanner.cancel_and_wait();
        self.should_quit = true;
    }

    pub fn scan_state(&self) -> ScanState {
        self.scanner.state()
    }

    /// Set a transient status message that auto-clears after a few seconds.
    pub fn set_status(&mut self, msg: &str) {
        self.status_message = Some((msg.to_string(), Instant::now(), false));
    }

    fn set_scan_status(&mut self, msg: String) {
        self.status_message = Some((msg, Instant::now(), true));
    }

    /// Ensure the selected row is visible given the current scroll offset.
    pub fn ensure_selected_visible(&mut self) {
        let vp = self.list_viewport_height.max(1);
        if self.selected < self.list_scroll_offset {
            self.list_scroll_offset = self.selected;
        } else if self.selected >= self.list_scroll_offset + vp {
            self.list_scroll_offset = self.selected.saturating_sub(vp - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::Folder;
    use std::io::Write;

    fn archive() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..12 {
            let labels = if i % 4 == 0 { "Sent" } else { "Inbox,Important" };
            write!(
                f,
                "From u{i}@x Mon Jan 01 00:00:00 2024\nFrom: user{i}@example.com\nSubject: note {i}\nX-Gmail-Labels: {labels}\n\nbody {i}\n\n"
            )
            .unwrap();
        }
        f.flush().unwrap();
        f
    }

    fn loaded_app(tmp: &tempfile::NamedTempFile) -> App {
        let mut app = App::open(tmp.path(), &Config::default()).unwrap();
        app.scanner.wait();
        app.tick();
        app
    }

    #[test]
    fn test_scan_fills_sidebar_and_selects_first() {
        let tmp = archive();
        let app = loaded_app(&tmp);
        assert_eq!(app.scan_state(), ScanState::Finished);
        assert!(!app.show_loading);
        assert_eq!(app.sidebar[0], SidebarEntry { filter: FolderFilter::All, count: 12 });
        assert!(app.sidebar.contains(&SidebarEntry {
            filter: FolderFilter::Only(Folder::Sent),
            count: 3
        }));
        assert_eq!(app.visible_count(), 9);
        assert!(app.current_text.as_deref().is_some_and(|t| t.contains("body 1")));
        let status = app.status_message.as_ref().map(|(m, _, _)| m.as_str());
        assert_eq!(status, Some("Done. 12 emails loaded."));
    }

    #[test]
    fn test_sidebar_selection_filters_and_stays_selected() {
        let tmp = archive();
        let mut app = loaded_app(&tmp);
        let sent = app
            .sidebar
            .iter()
            .position(|e| e.filter == FolderFilter::Only(Folder::Sent))
            .unwrap();
        app.sidebar_selected = sent;
        app.apply_sidebar_selection();
        assert_eq!(app.visible_count(), 3);

        app.refresh_sidebar();
        assert_eq!(app.sidebar_selected, sent);
    }

    #[test]
    fn test_live_search_updates_display() {
        let tmp = archive();
        let mut app = loaded_app(&tmp);
        app.index.set_filter(FilterUpdate::folder(FolderFilter::All));
        app.search_query = "NOTE 1".to_string();
        app.update_search();
        // note 1, note 10, note 11
        assert_eq!(app.visible_count(), 3);
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn test_open_missing_file_fails_early() {
        assert!(App::open(Path::new("/missing/archive.mbox"), &Config::default()).is_err());
    }

    #[test]
    fn test_reload_starts_new_cycle() {
        let tmp = archive();
        let mut app = loaded_app(&tmp);
        let first_key = app.current_key.unwrap();
        app.reload();
        app.scanner.wait();
        app.tick();
        assert_eq!(app.index.len(), 12);
        let new_key = app.current_key.unwrap();
        assert_eq!(new_key.index, first_key.index);
        assert_ne!(new_key.generation, first_key.generation);
    }

    #[test]
    fn test_reload_clears_search_keeps_folder() {
        let tmp = archive();
        let mut app = loaded_app(&tmp);
        app.search_query = "note 1".to_string();
        app.update_search();
        assert_eq!(app.visible_count(), 3);

        app.reload();
        app.scanner.wait();
        app.tick();
        assert!(app.search_query.is_empty());
        let criteria = app.index.criteria();
        assert!(criteria.search.is_empty());
        assert_eq!(criteria.folder, FolderFilter::Only(Folder::Inbox));
        assert_eq!(app.visible_count(), 9);
    }

    #[test]
    fn test_quit_waits_for_scan() {
        let tmp = archive();
        let mut app = App::open(tmp.path(), &Config::default()).unwrap();
        app.quit();
        assert!(app.should_quit);
        assert!(!app.scanner.is_running());
    }
}
