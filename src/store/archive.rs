//! Archive store: owns the open MBOX file and serves raw messages by key.
//!
//! The file handle is not safe for uncoordinated access (seek + read is two
//! calls), so every touch of it happens under one mutex. The lock is held only
//! for the seek and the read itself; callers decode the bytes after the guard
//! is dropped.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::config::PerformanceConfig;
use crate::error::{MboxError, Result};
use crate::model::record::MessageKey;
use crate::parser::mbox::{is_mbox_separator, MboxParser, MessageSpan};

/// The archive loaded for one load cycle.
struct OpenArchive {
    path: PathBuf,
    file: File,
    spans: Vec<MessageSpan>,
    file_size: u64,
    generation: u64,
}

#[derive(Default)]
struct StoreState {
    archive: Option<OpenArchive>,
    /// Incremented on every successful `open`; never reused.
    generation: u64,
}

/// Random-access reader for one MBOX archive at a time.
///
/// Shared between the control thread and the scan worker as `Arc<ArchiveStore>`.
pub struct ArchiveStore {
    state: Mutex<StoreState>,
    read_buffer_size: usize,
    max_message_size: u64,
}

impl ArchiveStore {
    /// Create a store with no archive open.
    pub fn new(config: &PerformanceConfig) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            read_buffer_size: config.read_buffer_size,
            max_message_size: config.max_message_size as u64,
        }
    }

    /// Open `path` and return its message count.
    ///
    /// Only message boundaries are walked; no message is parsed. On success
    /// any previously open archive is released and all of its keys become
    /// stale. On failure the store keeps no partial state: it is left closed.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let parser = MboxParser::new(path)?.with_read_buffer_size(self.read_buffer_size);

        let walked = parser.validate().and_then(|()| parser.scan_spans(None));
        let spans = match walked {
            Ok(spans) => spans,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                self.close();
                return Err(MboxError::io(path, e));
            }
        };
        let count = spans.len();
        let file_size = parser.file_size();

        let mut state = self.lock();
        state.generation += 1;
        let generation = state.generation;
        state.archive = Some(OpenArchive {
            path: path.to_path_buf(),
            file,
            spans,
            file_size,
            generation,
        });
        drop(state);

        info!(
            path = %path.display(),
            messages = count,
            generation,
            "Opened archive"
        );
        Ok(count)
    }

    /// Release the open archive, if any.
    pub fn close(&self) {
        let mut state = self.lock();
        if let Some(archive) = state.archive.take() {
            debug!(path = %archive.path.display(), "Closed archive");
        }
    }

    /// All keys of the open archive in file order. Empty when closed.
    pub fn list_keys(&self) -> Vec<MessageKey> {
        let state = self.lock();
        match &state.archive {
            Some(archive) => (0..archive.spans.len() as u64)
                .map(|index| MessageKey::new(archive.generation, index))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Read the raw bytes of one message (separator line included).
    ///
    /// Messages longer than `max_message_size` are truncated to that many
    /// bytes; the header block is kept.
    ///
    /// Fails with [`MboxError::MessageRead`] when the key belongs to another
    /// load cycle, is out of range, or the bytes on disk no longer look like
    /// the message that was indexed.
    pub fn fetch_raw(&self, key: MessageKey) -> Result<Vec<u8>> {
        let buf = {
            let mut state = self.lock();
            let archive = state
                .archive
                .as_mut()
                .ok_or_else(|| MboxError::message_read(key, "no archive is open"))?;
            if archive.generation != key.generation {
                return Err(MboxError::message_read(
                    key,
                    "key belongs to a previously loaded archive",
                ));
            }
            let span = *archive
                .spans
                .get(key.index as usize)
                .ok_or_else(|| MboxError::message_read(key, "key out of range"))?;
            let length = span.length.min(self.max_message_size);
            if length < span.length {
                warn!(
                    offset = span.offset,
                    length = span.length,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
            }

            debug!(offset = span.offset, length, "Reading message from MBOX");
            archive
                .file
                .seek(SeekFrom::Start(span.offset))
                .map_err(|e| MboxError::message_read(key, e.to_string()))?;
            let mut buf = vec![0u8; length as usize];
            archive
                .file
                .read_exact(&mut buf)
                .map_err(|e| MboxError::message_read(key, e.to_string()))?;
            buf
        };

        if !is_mbox_separator(&buf) {
            return Err(MboxError::message_read(
                key,
                "record does not start with a 'From ' separator",
            ));
        }
        Ok(buf)
    }

    /// Path of the open archive.
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().archive.as_ref().map(|a| a.path.clone())
    }

    /// Size in bytes of the open archive as walked by `open` (0 when closed).
    pub fn file_size(&self) -> u64 {
        self.lock().archive.as_ref().map_or(0, |a| a.file_size)
    }

    /// Number of messages in the open archive (0 when closed).
    pub fn message_count(&self) -> usize {
        self.lock().archive.as_ref().map_or(0, |a| a.spans.len())
    }

    /// Generation of the open archive, `None` when closed.
    pub fn generation(&self) -> Option<u64> {
        self.lock().archive.as_ref().map(|a| a.generation)
    }

    /// A panic while holding the lock cannot leave the file in a state that
    /// the next seek does not repair, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ArchiveStore {
    fn default() -> Self {
        Self::new(&PerformanceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn mbox(n: usize) -> String {
        let mut s = String::new();
        for i in 0..n {
            s.push_str(&format!(
                "From u{i}@x.com Mon Jan 01 00:00:00 2024\nFrom: u{i}@x.com\nSubject: msg {i}\n\nbody {i}\n\n"
            ));
        }
        s
    }

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_open_counts_and_fetches() {
        let tmp = write_tmp(&mbox(3));
        let store = ArchiveStore::default();
        assert_eq!(store.open(tmp.path()).unwrap(), 3);
        assert_eq!(store.file_size(), mbox(3).len() as u64);
        let keys = store.list_keys();
        assert_eq!(keys.len(), 3);
        let raw = store.fetch_raw(keys[1]).unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("From u1@x.com"));
        assert!(text.contains("Subject: msg 1"));
    }

    #[test]
    fn test_stale_key_after_reopen() {
        let first = write_tmp(&mbox(2));
        let second = write_tmp(&mbox(4));
        let store = ArchiveStore::default();
        store.open(first.path()).unwrap();
        let old = store.list_keys()[0];
        store.open(second.path()).unwrap();
        let err = store.fetch_raw(old).unwrap_err();
        assert!(matches!(err, MboxError::MessageRead { .. }));
        assert_eq!(store.message_count(), 4);
    }

    #[test]
    fn test_open_missing_file() {
        let store = ArchiveStore::default();
        let err = store.open("/no/such/archive.mbox").unwrap_err();
        assert!(matches!(err, MboxError::FileNotFound(_)));
        assert!(store.path().is_none());
    }

    #[test]
    fn test_failed_open_releases_previous_archive() {
        let good = write_tmp(&mbox(2));
        let bad = write_tmp("this is not an mbox\n");
        let store = ArchiveStore::default();
        store.open(good.path()).unwrap();
        assert!(matches!(store.open(bad.path()), Err(MboxError::InvalidMbox(_))));
        assert!(store.list_keys().is_empty());
        assert!(store.generation().is_none());
    }

    #[test]
    fn test_fetch_without_archive() {
        let store = ArchiveStore::default();
        let err = store.fetch_raw(MessageKey::new(1, 0)).unwrap_err();
        assert!(matches!(err, MboxError::MessageRead { .. }));
    }

    #[test]
    fn test_oversized_message_is_truncated() {
        let tmp = write_tmp(&mbox(2));
        let config = PerformanceConfig {
            max_message_size: 16,
            ..PerformanceConfig::default()
        };
        let store = ArchiveStore::new(&config);
        store.open(tmp.path()).unwrap();
        let key = store.list_keys()[1];
        let raw = store.fetch_raw(key).unwrap();
        assert_eq!(raw, b"From u1@x.com Mo");
    }
}
