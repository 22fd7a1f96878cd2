//! Change Source Module
//!
//! Watches resource roots and emits debounced change batches.
//! Uses notify-rs for cross-platform file system events, or its polling
//! watcher where native notifications are unreliable.

mod debounce;
mod filter;
#[cfg(test)]
mod tests;

pub use debounce::Debouncer;
pub use filter::{FilterReason, FilterResult, ResourceFilter, WatchedResource};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use uuid::Uuid;

use crate::core::config::RestartConfig;
use crate::core::error::{RestartError, Result};

/// Longest the debounce thread sleeps before re-checking for shutdown
const IDLE_TICK: Duration = Duration::from_millis(100);

/// Kind of change observed for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One change to one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEntry {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, coalesced group of changes treated as one restart trigger
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    /// Unique batch ID
    pub id: Uuid,
    /// Timestamp when batch was created
    pub created_at: DateTime<Utc>,
    entries: Vec<ChangeEntry>,
    /// Position of each path in `entries`
    index: HashMap<PathBuf, usize>,
}

impl ChangeBatch {
    pub fn empty() -> Self {
        Self {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a batch, collapsing repeated paths
    pub fn from_entries(entries: impl IntoIterator<Item = ChangeEntry>) -> Self {
        let mut batch = Self::empty();
        for entry in entries {
            batch.record(entry);
        }
        batch
    }

    /// Add an entry; an existing entry for the same path takes the new kind
    /// and timestamp but keeps its position.
    pub fn record(&mut self, entry: ChangeEntry) {
        match self.index.get(&entry.path) {
            Some(&pos) => {
                let existing = &mut self.entries[pos];
                existing.kind = entry.kind;
                existing.timestamp = entry.timestamp;
            }
            None => {
                self.index.insert(entry.path.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Union `other` into this batch, in arrival order
    pub fn merge(&mut self, other: ChangeBatch) {
        for entry in other.entries {
            self.record(entry);
        }
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Callback receiving debounced batches
pub type BatchSink = Arc<dyn Fn(ChangeBatch) + Send + Sync>;

/// Something that watches resources and reports change batches
pub trait ChangeSource: Send {
    /// Begin watching; batches are delivered to `sink` in arrival order
    fn start(&mut self, resources: &[WatchedResource], sink: BatchSink) -> Result<()>;

    /// Stop watching and discard anything buffered. Safe to call repeatedly.
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Configuration for the FileChangeSource
#[derive(Debug, Clone)]
pub struct FileChangeSourceConfig {
    /// Quiet window before a batch is emitted
    pub quiet_period: Duration,
    /// Poll interval for the polling watcher
    pub poll_interval: Duration,
    /// Use the polling watcher instead of native notifications
    pub use_polling: bool,
    /// Only emit once this file changes
    pub trigger_file: Option<String>,
}

impl Default for FileChangeSourceConfig {
    fn default() -> Self {
        Self::from(&RestartConfig::default())
    }
}

impl From<&RestartConfig> for FileChangeSourceConfig {
    fn from(config: &RestartConfig) -> Self {
        Self {
            quiet_period: config.quiet_period(),
            poll_interval: config.poll_interval(),
            use_polling: config.use_polling,
            trigger_file: config.trigger_file.clone(),
        }
    }
}

/// File system change source backed by notify
pub struct FileChangeSource {
    config: FileChangeSourceConfig,
    watcher: Option<Box<dyn Watcher + Send>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FileChangeSource {
    pub fn new(config: FileChangeSourceConfig) -> Self {
        Self {
            config,
            watcher: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn create_watcher(
        &self,
        raw_tx: mpsc::Sender<notify::Result<Event>>,
    ) -> Result<Box<dyn Watcher + Send>> {
        let watcher: Box<dyn Watcher + Send> = if self.config.use_polling {
            let config = notify::Config::default().with_poll_interval(self.config.poll_interval);
            Box::new(PollWatcher::new(raw_tx, config)?)
        } else {
            Box::new(RecommendedWatcher::new(raw_tx, notify::Config::default())?)
        };
        Ok(watcher)
    }
}

impl ChangeSource for FileChangeSource {
    fn start(&mut self, resources: &[WatchedResource], sink: BatchSink) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = self.create_watcher(raw_tx)?;

        for resource in resources {
            let root = resource.root();
            if !root.exists() {
                tracing::warn!(root = ?root, "Watched root does not exist, skipping");
                continue;
            }
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| RestartError::Watch(format!("Failed to watch {:?}: {}", root, e)))?;
            tracing::debug!(root = ?root, "Watching root");
        }

        self.shutdown = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::clone(&self.shutdown);
        let watched = resources.to_vec();
        let debouncer = Debouncer::new(self.config.quiet_period)
            .with_trigger_file(self.config.trigger_file.clone());

        let handle = thread::Builder::new()
            .name("change-source".to_string())
            .spawn(move || run_debounce_loop(raw_rx, watched, debouncer, shutdown, sink))?;

        self.watcher = Some(watcher);
        self.worker = Some(handle);
        tracing::info!(roots = resources.len(), "Change source started");
        Ok(())
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Dropping the watcher closes the raw channel
        self.watcher = None;

        if let Some(handle) = self.worker.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
            tracing::info!("Change source stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for FileChangeSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_debounce_loop(
    raw_rx: mpsc::Receiver<notify::Result<Event>>,
    resources: Vec<WatchedResource>,
    mut debouncer: Debouncer,
    shutdown: Arc<AtomicBool>,
    sink: BatchSink,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let timeout = debouncer
            .deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_TICK)
            .min(IDLE_TICK);

        match raw_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                let now = Instant::now();
                for entry in translate_event(&event) {
                    if resources.iter().any(|r| r.accepts(&entry.path)) {
                        debouncer.push(entry, now);
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Watch error: {}", e);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(batch) = debouncer.poll(Instant::now()) {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            tracing::debug!(batch_id = %batch.id, entries = batch.len(), "Emitting change batch");
            sink(batch);
        }
    }

    debouncer.clear();
}

/// Convert a notify event to change entries
pub(crate) fn translate_event(event: &Event) -> Vec<ChangeEntry> {
    let kind = match &event.kind {
        EventKind::Create(_) => ChangeKind::Added,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(mode)) => {
            return translate_rename(*mode, &event.paths);
        }
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| ChangeEntry::new(path.clone(), kind))
        .collect()
}

fn translate_rename(mode: RenameMode, paths: &[PathBuf]) -> Vec<ChangeEntry> {
    match (mode, paths) {
        (RenameMode::From, _) => paths
            .iter()
            .map(|p| ChangeEntry::new(p.clone(), ChangeKind::Deleted))
            .collect(),
        (RenameMode::To, _) => paths
            .iter()
            .map(|p| ChangeEntry::new(p.clone(), ChangeKind::Added))
            .collect(),
        (RenameMode::Both, [from, to, ..]) => vec![
            ChangeEntry::new(from.clone(), ChangeKind::Deleted),
            ChangeEntry::new(to.clone(), ChangeKind::Added),
        ],
        _ => paths
            .iter()
            .map(|p| ChangeEntry::new(p.clone(), ChangeKind::Modified))
            .collect(),
    }
}
