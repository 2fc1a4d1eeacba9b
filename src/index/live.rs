//! Live index: every header record discovered so far plus the filtered view.
//!
//! The master set only grows (in scan discovery order). The display set is a
//! list of positions into it that satisfy the current [`FilterCriteria`].
//! Appends and filter changes take the same write lock, so a reader holding
//! the read lock always sees a whole number of batches and a display set that
//! matches the criteria.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::model::record::{Folder, HeaderRecord, MessageKey};
use crate::scan::BatchSink;

/// Folder half of the filter: everything, or one folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderFilter {
    All,
    Only(Folder),
}

impl Default for FolderFilter {
    fn default() -> Self {
        FolderFilter::Only(Folder::Inbox)
    }
}

impl FolderFilter {
    fn accepts(self, folder: Folder) -> bool {
        match self {
            FolderFilter::All => true,
            FolderFilter::Only(f) => folder == f,
        }
    }

    /// The selected folder, `None` for "All".
    pub fn folder(self) -> Option<Folder> {
        match self {
            FolderFilter::All => None,
            FolderFilter::Only(f) => Some(f),
        }
    }
}

impl From<Folder> for FolderFilter {
    fn from(folder: Folder) -> Self {
        FolderFilter::Only(folder)
    }
}

impl fmt::Display for FolderFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.folder() {
            None => f.write_str("All"),
            Some(folder) => write!(f, "{folder}"),
        }
    }
}

impl FromStr for FolderFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(FolderFilter::All)
        } else {
            s.parse::<Folder>().map(FolderFilter::Only)
        }
    }
}

/// Active filter: a folder and a lowercase search substring.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterCriteria {
    pub folder: FolderFilter,
    /// Lowercase; empty matches everything.
    pub search: String,
}

impl FilterCriteria {
    /// Does `record` pass this filter?
    pub fn matches(&self, record: &HeaderRecord) -> bool {
        if !self.folder.accepts(record.folder) {
            return false;
        }
        if self.search.is_empty() {
            return true;
        }
        record.sender.to_lowercase().contains(&self.search)
            || record.subject.to_lowercase().contains(&self.search)
    }
}

/// Partial filter change. `None` leaves that criterion as it is.
#[derive(Debug, Clone, Default)]
pub struct FilterUpdate {
    pub folder: Option<FolderFilter>,
    pub search: Option<String>,
}

impl FilterUpdate {
    pub fn folder(folder: impl Into<FolderFilter>) -> Self {
        Self {
            folder: Some(folder.into()),
            search: None,
        }
    }

    pub fn search(text: impl Into<String>) -> Self {
        Self {
            folder: None,
            search: Some(text.into()),
        }
    }
}

/// Per-folder totals over the master set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderCounts {
    counts: BTreeMap<Folder, usize>,
}

impl FolderCounts {
    /// Count for one folder (0 if none were seen).
    pub fn get(&self, folder: Folder) -> usize {
        self.counts.get(&folder).copied().unwrap_or(0)
    }

    /// The "All" figure: sum over every folder.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Folders with at least one message, in sidebar order.
    pub fn non_empty(&self) -> Vec<(Folder, usize)> {
        Folder::ALL
            .into_iter()
            .filter_map(|f| self.counts.get(&f).map(|&c| (f, c)))
            .filter(|&(_, c)| c > 0)
            .collect()
    }

    fn add(&mut self, folder: Folder) {
        *self.counts.entry(folder).or_insert(0) += 1;
    }
}

#[derive(Default)]
struct IndexState {
    /// Master set, discovery order.
    records: Vec<HeaderRecord>,
    /// Positions into `records` passing `criteria`, ascending.
    visible: Vec<usize>,
    criteria: FilterCriteria,
    counts: FolderCounts,
}

impl IndexState {
    fn recompute(&mut self) {
        let criteria = &self.criteria;
        self.visible = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| criteria.matches(r))
            .map(|(i, _)| i)
            .collect();
    }
}

/// Thread-safe store of all discovered header records and the filtered view.
#[derive(Default)]
pub struct LiveIndex {
    state: RwLock<IndexState>,
}

impl LiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index starting from `criteria` instead of the Inbox default.
    pub fn with_criteria(criteria: FilterCriteria) -> Self {
        let index = Self::default();
        index.write().criteria = FilterCriteria {
            search: criteria.search.to_lowercase(),
            ..criteria
        };
        index
    }

    /// Append a batch to the master set and extend the display set.
    ///
    /// Only the new records are tested against the criteria; since the
    /// criteria cannot change while the write lock is held, the result equals
    /// a full recompute.
    pub fn append_batch(&self, batch: Vec<HeaderRecord>) {
        let mut state = self.write();
        let IndexState {
            records,
            visible,
            criteria,
            counts,
        } = &mut *state;
        let start = records.len();
        for (offset, record) in batch.into_iter().enumerate() {
            counts.add(record.folder);
            if criteria.matches(&record) {
                visible.push(start + offset);
            }
            records.push(record);
        }
        debug!(total = records.len(), visible = visible.len(), "Appended batch");
    }

    /// Apply a (partial) filter change and recompute the display set.
    pub fn set_filter(&self, update: FilterUpdate) {
        let mut state = self.write();
        if let Some(folder) = update.folder {
            state.criteria.folder = folder;
        }
        if let Some(search) = update.search {
            state.criteria.search = search.to_lowercase();
        }
        state.recompute();
    }

    /// Empty the master and display sets. The criteria are kept.
    pub fn clear(&self) {
        let mut state = self.write();
        state.records.clear();
        state.visible.clear();
        state.counts = FolderCounts::default();
    }

    /// Per-folder counts over the master set.
    pub fn folder_counts(&self) -> FolderCounts {
        self.read().counts.clone()
    }

    /// Current criteria.
    pub fn criteria(&self) -> FilterCriteria {
        self.read().criteria.clone()
    }

    /// Size of the master set.
    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the display set.
    pub fn display_len(&self) -> usize {
        self.read().visible.len()
    }

    /// Copy of the whole display set, in discovery order.
    pub fn display_records(&self) -> Vec<HeaderRecord> {
        self.display_page(0, usize::MAX)
    }

    /// Copy of up to `len` display rows starting at `start`.
    pub fn display_page(&self, start: usize, len: usize) -> Vec<HeaderRecord> {
        let state = self.read();
        state
            .visible
            .iter()
            .skip(start)
            .take(len)
            .map(|&i| state.records[i].clone())
            .collect()
    }

    /// Record shown at display row `row`.
    pub fn record_at(&self, row: usize) -> Option<HeaderRecord> {
        let state = self.read();
        state.visible.get(row).map(|&i| state.records[i].clone())
    }

    /// Key of the record shown at display row `row`.
    pub fn key_at(&self, row: usize) -> Option<MessageKey> {
        let state = self.read();
        state.visible.get(row).map(|&i| state.records[i].key)
    }


    /// Copy of the master set, in discovery order.
    pub fn all_records(&self) -> Vec<HeaderRecord> {
        self.read().records.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BatchSink for LiveIndex {
    fn append_batch(&self, batch: Vec<HeaderRecord>) {
        LiveIndex::append_batch(self, batch);
    }
}
