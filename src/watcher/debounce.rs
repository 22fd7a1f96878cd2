//! Quiet-window debouncing of raw change events
//!
//! Raw entries are buffered until no new entry has arrived for the quiet
//! period. Entries for the same path collapse to the latest kind.

use std::path::Path;
use std::time::{Duration, Instant};

use super::{ChangeBatch, ChangeEntry};

/// Buffers raw entries and releases them as a single batch
#[derive(Debug)]
pub struct Debouncer {
    quiet_period: Duration,
    trigger_file: Option<String>,
    pending: ChangeBatch,
    last_event: Option<Instant>,
    trigger_seen: bool,
}

impl Debouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            trigger_file: None,
            pending: ChangeBatch::empty(),
            last_event: None,
            trigger_seen: false,
        }
    }

    /// Hold batches until one of them touches `trigger_file`
    pub fn with_trigger_file(mut self, trigger_file: Option<String>) -> Self {
        self.trigger_file = trigger_file;
        self
    }

    /// Buffer a raw entry observed at `now`
    pub fn push(&mut self, entry: ChangeEntry, now: Instant) {
        if !self.trigger_seen {
            self.trigger_seen = self.is_trigger(&entry.path);
        }
        self.pending.record(entry);
        self.last_event = Some(now);
    }

    /// Instant at which the buffered entries become a batch, if any
    pub fn deadline(&self) -> Option<Instant> {
        if self.pending.is_empty() || !self.trigger_seen {
            return None;
        }
        self.last_event.map(|last| last + self.quiet_period)
    }

    /// Take the batch if the quiet window has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<ChangeBatch> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }

        self.last_event = None;
        self.trigger_seen = false;
        Some(std::mem::replace(&mut self.pending, ChangeBatch::empty()))
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.pending = ChangeBatch::empty();
        self.last_event = None;
        self.trigger_seen = false;
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    fn is_trigger(&self, path: &Path) -> bool {
        match &self.trigger_file {
            None => true,
            Some(trigger) => path.ends_with(Path::new(trigger)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::ChangeKind;
    use std::path::PathBuf;

    fn entry(path: &str, kind: ChangeKind) -> ChangeEntry {
        ChangeEntry::new(PathBuf::from(path), kind)
    }

    #[test]
    fn test_nothing_buffered() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        assert!(debouncer.deadline().is_none());
        assert!(debouncer.poll(Instant::now()).is_none());
    }

    #[test]
    fn test_emits_after_quiet_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.push(entry("/src/a.rs", ChangeKind::Modified), start);

        assert!(debouncer.poll(start + Duration::from_millis(50)).is_none());

        let batch = debouncer.poll(start + Duration::from_millis(100)).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(debouncer.buffered(), 0);
    }

    #[test]
    fn test_new_event_extends_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.push(entry("/src/a.rs", ChangeKind::Modified), start);
        debouncer.push(
            entry("/src/b.rs", ChangeKind::Added),
            start + Duration::from_millis(80),
        );

        assert!(debouncer.poll(start + Duration::from_millis(120)).is_none());
        let batch = debouncer.poll(start + Duration::from_millis(180)).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_same_path_collapses_to_latest_kind() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.push(entry("/src/a.rs", ChangeKind::Added), start);
        debouncer.push(entry("/src/b.rs", ChangeKind::Modified), start);
        debouncer.push(entry("/src/a.rs", ChangeKind::Deleted), start);

        let batch = debouncer.poll(start + Duration::from_millis(10)).unwrap();
        let kinds: Vec<_> = batch
            .entries()
            .iter()
            .map(|e| (e.path.clone(), e.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (PathBuf::from("/src/a.rs"), ChangeKind::Deleted),
                (PathBuf::from("/src/b.rs"), ChangeKind::Modified),
            ]
        );
    }

    #[test]
    fn test_trigger_file_holds_batches() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(10))
            .with_trigger_file(Some(".reloadtrigger".to_string()));

        debouncer.push(entry("/src/a.rs", ChangeKind::Modified), start);
        assert!(debouncer.poll(start + Duration::from_secs(5)).is_none());
        assert_eq!(debouncer.buffered(), 1);

        let later = start + Duration::from_secs(6);
        debouncer.push(entry("/src/.reloadtrigger", ChangeKind::Modified), later);
        let batch = debouncer.poll(later + Duration::from_millis(10)).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_trigger_is_needed_again_after_each_batch() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(10))
            .with_trigger_file(Some(".reloadtrigger".to_string()));

        debouncer.push(entry("/src/.reloadtrigger", ChangeKind::Modified), start);
        assert!(debouncer.poll(start + Duration::from_millis(10)).is_some());

        let later = start + Duration::from_secs(1);
        debouncer.push(entry("/src/a.rs", ChangeKind::Modified), later);
        assert!(debouncer.poll(later + Duration::from_secs(5)).is_none());
        assert_eq!(debouncer.buffered(), 1);
    }

    #[test]
    fn test_clear_discards_buffer() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.push(entry("/src/a.rs", ChangeKind::Modified), start);
        debouncer.clear();
        assert!(debouncer.poll(start + Duration::from_secs(1)).is_none());
    }
}
