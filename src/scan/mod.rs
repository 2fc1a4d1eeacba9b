//! Background header scan.
//!
//! One worker thread per load walks every message key of the open archive,
//! fetches the raw bytes, extracts a [`HeaderRecord`] and publishes records in
//! fixed-size batches: first into a [`BatchSink`] (normally the
//! [`LiveIndex`](crate::index::LiveIndex)), then as a [`ScanEvent`] on an mpsc
//! channel for the presentation layer. A shared [`CancelToken`] is polled
//! before every message and before every publish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, error, info};

use crate::model::record::HeaderRecord;
use crate::parser::header::extract_record;
use crate::store::archive::ArchiveStore;

/// Default number of records per published batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Receives each batch before it is announced on the event channel.
pub trait BatchSink: Send + Sync {
    fn append_batch(&self, batch: Vec<HeaderRecord>);
}

/// Cooperative cancellation flag shared with the worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    Finished,
    Cancelled,
}

/// Messages from the worker to the presentation layer.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Records already appended to the sink, in discovery order.
    Batch(Vec<HeaderRecord>),
    /// Percentage of `total` processed so far (0..=100).
    Progress(u8),
    Finished { processed: usize, skipped: usize },
    Cancelled { processed: usize },
}

/// Result of one worker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Records successfully extracted and published.
    pub processed: usize,
    /// Messages that could not be read.
    pub skipped: usize,
    pub state: ScanState,
}

/// Owns the worker thread of the current load cycle.
pub struct ScanCoordinator {
    batch_size: usize,
    token: CancelToken,
    state: Arc<Mutex<ScanState>>,
    worker: Option<JoinHandle<ScanSummary>>,
}

impl ScanCoordinator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            token: CancelToken::new(),
            state: Arc::new(Mutex::new(ScanState::Idle)),
            worker: None,
        }
    }

    /// Start scanning `store`, replacing any scan still in progress.
    ///
    /// `total` is the message count returned by [`ArchiveStore::open`] and is
    /// only used for progress percentages.
    pub fn start(
        &mut self,
        store: Arc<ArchiveStore>,
        total: usize,
        sink: Arc<dyn BatchSink>,
    ) -> Receiver<ScanEvent> {
        self.cancel_and_wait();

        let (tx, rx) = mpsc::channel();
        self.token = CancelToken::new();
        self.state = Arc::new(Mutex::new(ScanState::Scanning));

        let worker = ScanWorker {
            store,
            sink,
            token: self.token.clone(),
            events: tx,
            state: Arc::clone(&self.state),
            batch_size: self.batch_size,
            total,
        };
        let spawned = std::thread::Builder::new()
            .name("mbox-scan".to_string())
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                info!(total, batch_size = self.batch_size, "Scan started");
                self.worker = Some(handle);
            }
            Err(e) => {
                error!(error = %e, "Failed to spawn scan thread");
                set_state(&self.state, ScanState::Idle);
            }
        }
        rx
    }

    /// Ask the worker to stop. Returns immediately.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token of the current (or last) scan.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Block until the worker exits. `None` if no worker was running or it panicked.
    pub fn wait(&mut self) -> Option<ScanSummary> {
        let handle = self.worker.take()?;
        match handle.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                error!("Scan thread panicked");
                set_state(&self.state, ScanState::Cancelled);
                None
            }
        }
    }

    pub fn cancel_and_wait(&mut self) -> Option<ScanSummary> {
        self.cancel();
        self.wait()
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state() == ScanState::Scanning
    }
}

impl Default for ScanCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl Drop for ScanCoordinator {
    fn drop(&mut self) {
        self.cancel_and_wait();
    }
}

fn set_state(state: &Mutex<ScanState>, value: ScanState) {
    *state.lock().unwrap_or_else(|p| p.into_inner()) = value;
}

/// Everything one worker run needs, moved onto the scan thread.
struct ScanWorker {
    store: Arc<ArchiveStore>,
    sink: Arc<dyn BatchSink>,
    token: CancelToken,
    events: Sender<ScanEvent>,
    state: Arc<Mutex<ScanState>>,
    batch_size: usize,
    total: usize,
}

impl ScanWorker {
    fn run(self) -> ScanSummary {
        let mut processed = 0usize;
        let mut skipped = 0usize;
        let mut batch = Vec::with_capacity(self.batch_size);

        for key in self.store.list_keys() {
            if self.token.is_cancelled() {
                return self.cancelled(processed - batch.len(), skipped);
            }
            let raw = match self.store.fetch_raw(key) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping unreadable message");
                    skipped += 1;
                    continue;
                }
            };
            batch.push(extract_record(key, &raw));
            processed += 1;

            if batch.len() >= self.batch_size {
                if self.token.is_cancelled() {
                    return self.cancelled(processed - batch.len(), skipped);
                }
                self.publish(std::mem::take(&mut batch), processed);
            }
        }

        if !batch.is_empty() {
            if self.token.is_cancelled() {
                return self.cancelled(processed - batch.len(), skipped);
            }
            self.publish(batch, processed);
        }

        set_state(&self.state, ScanState::Finished);
        info!(processed, skipped, "Scan finished");
        let _ = self.events.send(ScanEvent::Finished { processed, skipped });
        ScanSummary {
            processed,
            skipped,
            state: ScanState::Finished,
        }
    }

    fn publish(&self, batch: Vec<HeaderRecord>, processed: usize) {
        self.sink.append_batch(batch.clone());
        let _ = self.events.send(ScanEvent::Batch(batch));
        if let Some(pct) = progress_percent(processed, self.total) {
            let _ = self.events.send(ScanEvent::Progress(pct));
        }
    }

    /// `processed` counts only records that reached the sink.
    fn cancelled(&self, processed: usize, skipped: usize) -> ScanSummary {
        set_state(&self.state, ScanState::Cancelled);
        info!(processed, "Scan cancelled");
        let _ = self.events.send(ScanEvent::Cancelled { processed });
        ScanSummary {
            processed,
            skipped,
            state: ScanState::Cancelled,
        }
    }
}

/// `round(processed / total * 100)`, clamped to 100. `None` when `total` is 0.
pub fn progress_percent(processed: usize, total: usize) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let pct = (processed as f64 / total as f64 * 100.0).round();
    Some(pct.min(100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::LiveIndex;
    use crate::model::record::MessageKey;
    use std::io::Write;

    fn mbox(n: usize) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..n {
            write!(
                f,
                "From u{i}@x.com Mon Jan 01 00:00:00 2024\nFrom: user{i}@x.com\nSubject: message {i}\nDate: Mon, 1 Jan 2024 10:00:00 +0000\n\nbody\n\n"
            )
            .unwrap();
        }
        f.flush().unwrap();
        f
    }

    /// Sink that cancels the scan while the given batch is being appended.
    struct CancelOnBatch {
        index: LiveIndex,
        token: CancelToken,
        cancel_on: usize,
        seen: Mutex<usize>,
    }

    impl BatchSink for CancelOnBatch {
        fn append_batch(&self, batch: Vec<HeaderRecord>) {
            self.index.append_batch(batch);
            let mut seen = self.seen.lock().unwrap();
            *seen += 1;
            if *seen == self.cancel_on {
                self.token.cancel();
            }
        }
    }

    fn worker(
        store: Arc<ArchiveStore>,
        sink: Arc<dyn BatchSink>,
        token: CancelToken,
        batch_size: usize,
    ) -> (ScanWorker, Receiver<ScanEvent>) {
        let (tx, rx) = mpsc::channel();
        let total = store.message_count();
        let worker = ScanWorker {
            store,
            sink,
            token,
            events: tx,
            state: Arc::new(Mutex::new(ScanState::Scanning)),
            batch_size,
            total,
        };
        (worker, rx)
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 0), None);
        assert_eq!(progress_percent(50, 120), Some(42));
        assert_eq!(progress_percent(120, 120), Some(100));
        assert_eq!(progress_percent(130, 120), Some(100));
        assert_eq!(progress_percent(1, 200), Some(1));
    }

    #[test]
    fn test_worker_publishes_all_batches() {
        let tmp = mbox(7);
        let store = Arc::new(ArchiveStore::default());
        store.open(tmp.path()).unwrap();
        let index = Arc::new(LiveIndex::new());
        let (worker, rx) = worker(store, index.clone(), CancelToken::new(), 3);

        let summary = worker.run();
        assert_eq!(summary.processed, 7);
        assert_eq!(summary.state, ScanState::Finished);
        assert_eq!(index.len(), 7);

        let events: Vec<ScanEvent> = rx.try_iter().collect();
        let batch_sizes: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Batch(b) => Some(b.len()),
                _ => None,
            })
            .collect();
        assert_eq!(batch_sizes, vec![3, 3, 1]);
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![43, 86, 100]);
        assert!(matches!(
            events.last(),
            Some(ScanEvent::Finished { processed: 7, skipped: 0 })
        ));
    }

    #[test]
    fn test_cancel_after_second_batch() {
        let tmp = mbox(250);
        let store = Arc::new(ArchiveStore::default());
        store.open(tmp.path()).unwrap();
        let token = CancelToken::new();
        let sink = Arc::new(CancelOnBatch {
            index: LiveIndex::new(),
            token: token.clone(),
            cancel_on: 2,
            seen: Mutex::new(0),
        });
        let (worker, rx) = worker(store, sink.clone(), token, 50);

        let summary = worker.run();
        assert_eq!(summary.state, ScanState::Cancelled);
        assert_eq!(summary.processed, 100);
        assert_eq!(sink.index.len(), 100);

        let events: Vec<ScanEvent> = rx.try_iter().collect();
        let batches = events
            .iter()
            .filter(|e| matches!(e, ScanEvent::Batch(_)))
            .count();
        assert_eq!(batches, 2);
        assert!(matches!(
            events.last(),
            Some(ScanEvent::Cancelled { processed: 100 })
        ));
        assert!(!events.iter().any(|e| matches!(e, ScanEvent::Finished { .. })));
    }

    #[test]
    fn test_batches_arrive_in_discovery_order() {
        let tmp = mbox(120);
        let store = Arc::new(ArchiveStore::default());
        store.open(tmp.path()).unwrap();
        let index = Arc::new(LiveIndex::new());
        let (worker, rx) = worker(store, index, CancelToken::new(), 50);
        worker.run();

        let keys: Vec<MessageKey> = rx
            .try_iter()
            .filter_map(|e| match e {
                ScanEvent::Batch(b) => Some(b),
                _ => None,
            })
            .flatten()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys.len(), 120);
        assert!(keys.windows(2).all(|w| w[0].index + 1 == w[1].index));
    }

    #[test]
    fn test_coordinator_runs_to_completion() {
        let tmp = mbox(60);
        let store = Arc::new(ArchiveStore::default());
        let total = store.open(tmp.path()).unwrap();
        let index = Arc::new(LiveIndex::new());
        let mut coordinator = ScanCoordinator::default();

        let rx = coordinator.start(store, total, index.clone());
        let summary = coordinator.wait().expect("worker summary");
        assert_eq!(summary.processed, 60);
        assert_eq!(coordinator.state(), ScanState::Finished);
        assert!(!coordinator.is_running());
        assert_eq!(index.len(), 60);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, ScanEvent::Finished { processed: 60, .. })));
    }

    #[test]
    fn test_empty_archive_finishes_without_progress() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let store = Arc::new(ArchiveStore::default());
        let total = store.open(tmp.path()).unwrap();
        let mut coordinator = ScanCoordinator::default();
        let rx = coordinator.start(store, total, Arc::new(LiveIndex::new()));
        coordinator.wait();

        let events: Vec<ScanEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ScanEvent::Finished { processed: 0, skipped: 0 }
        ));
    }

    #[test]
    fn test_wait_without_worker() {
        let mut coordinator = ScanCoordinator::new(10);
        assert!(coordinator.wait().is_none());
        assert_eq!(coordinator.state(), ScanState::Idle);
    }
}
