//! In-memory index of discovered header records.

pub mod live;

pub use live::{FilterCriteria, FilterUpdate, FolderCounts, FolderFilter, LiveIndex};
