//! Tests for the change source module
//!
//! Includes property-based tests for batch coalescing and an integration
//! test against a real temporary directory.

use super::*;
use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind, RenameMode};
use proptest::prelude::*;
use std::sync::mpsc as std_mpsc;
use tempfile::TempDir;

// ============================================================================
// Unit Tests for ChangeBatch
// ============================================================================

#[test]
fn test_empty_batch() {
    let batch = ChangeBatch::empty();
    assert!(batch.is_empty());
    assert!(!batch.id.is_nil());
}

#[test]
fn test_merge_is_union_in_arrival_order() {
    let mut first = ChangeBatch::from_entries(vec![
        ChangeEntry::new("/src/a.rs", ChangeKind::Modified),
        ChangeEntry::new("/src/b.rs", ChangeKind::Added),
    ]);
    let second = ChangeBatch::from_entries(vec![
        ChangeEntry::new("/src/c.rs", ChangeKind::Added),
        ChangeEntry::new("/src/a.rs", ChangeKind::Deleted),
    ]);

    first.merge(second);

    let paths: Vec<_> = first.entries().iter().map(|e| e.path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("/src/a.rs"),
            PathBuf::from("/src/b.rs"),
            PathBuf::from("/src/c.rs"),
        ]
    );
    assert_eq!(first.entries()[0].kind, ChangeKind::Deleted);
    assert!(first.contains(Path::new("/src/c.rs")));
}

#[test]
fn test_large_batch_collapses_in_linear_time() {
    // Roughly what a branch switch touches in an unexcluded tree
    const COUNT: usize = 20_000;
    let start = Instant::now();

    let path = |i: usize| PathBuf::from(format!("/src/mod{}/file.rs", i));

    let mut batch =
        ChangeBatch::from_entries((0..COUNT).map(|i| ChangeEntry::new(path(i), ChangeKind::Added)));
    batch.merge(ChangeBatch::from_entries(
        (0..COUNT).map(|i| ChangeEntry::new(path(i), ChangeKind::Deleted)),
    ));

    assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
    assert_eq!(batch.len(), COUNT);
    assert_eq!(batch.entries()[0].path, path(0));
    assert_eq!(batch.entries()[COUNT - 1].path, path(COUNT - 1));
    assert!(batch.entries().iter().all(|e| e.kind == ChangeKind::Deleted));
    assert!(batch.contains(Path::new("/src/mod4242/file.rs")));
}

// ============================================================================
// Unit Tests for notify translation
// ============================================================================

#[test]
fn test_translate_create_modify_remove() {
    let created = Event::new(EventKind::Create(CreateKind::File)).add_path("/src/a.rs".into());
    assert_eq!(translate_event(&created)[0].kind, ChangeKind::Added);

    let modified = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
        .add_path("/src/a.rs".into());
    assert_eq!(translate_event(&modified)[0].kind, ChangeKind::Modified);

    let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path("/src/a.rs".into());
    assert_eq!(translate_event(&removed)[0].kind, ChangeKind::Deleted);
}

#[test]
fn test_translate_rename_both() {
    let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
        .add_path("/src/old.rs".into())
        .add_path("/src/new.rs".into());

    let entries = translate_event(&event);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].path, PathBuf::from("/src/old.rs"));
    assert_eq!(entries[0].kind, ChangeKind::Deleted);
    assert_eq!(entries[1].path, PathBuf::from("/src/new.rs"));
    assert_eq!(entries[1].kind, ChangeKind::Added);
}

#[test]
fn test_translate_ignores_access() {
    let event = Event::new(EventKind::Access(notify::event::AccessKind::Any))
        .add_path("/src/a.rs".into());
    assert!(translate_event(&event).is_empty());
}

// ============================================================================
// Property-Based Tests for coalescing
// ============================================================================

fn kind_strategy() -> impl Strategy<Value = ChangeKind> {
    prop_oneof![
        Just(ChangeKind::Added),
        Just(ChangeKind::Modified),
        Just(ChangeKind::Deleted),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every path appears once, with the kind of its last raw entry
    #[test]
    fn coalesced_batch_keeps_latest_kind(
        raw in prop::collection::vec((0usize..8, kind_strategy()), 0..64)
    ) {
        let entries: Vec<_> = raw
            .iter()
            .map(|(i, kind)| ChangeEntry::new(format!("/src/file{}.rs", i), *kind))
            .collect();
        let batch = ChangeBatch::from_entries(entries.clone());

        let mut seen = std::collections::HashSet::new();
        for entry in batch.entries() {
            prop_assert!(seen.insert(entry.path.clone()), "duplicate path in batch");
            let latest = entries.iter().rev().find(|e| e.path == entry.path).unwrap();
            prop_assert_eq!(entry.kind, latest.kind);
        }
        let distinct: std::collections::HashSet<_> = entries.iter().map(|e| &e.path).collect();
        prop_assert_eq!(seen.len(), distinct.len());
    }

    /// Order of first appearance is preserved
    #[test]
    fn coalesced_batch_keeps_arrival_order(
        raw in prop::collection::vec(0usize..8, 0..64)
    ) {
        let entries: Vec<_> = raw
            .iter()
            .map(|i| ChangeEntry::new(format!("/src/file{}.rs", i), ChangeKind::Modified))
            .collect();
        let batch = ChangeBatch::from_entries(entries.clone());

        let mut expected: Vec<PathBuf> = Vec::new();
        for entry in &entries {
            if !expected.contains(&entry.path) {
                expected.push(entry.path.clone());
            }
        }
        let actual: Vec<PathBuf> = batch.entries().iter().map(|e| e.path.clone()).collect();
        prop_assert_eq!(actual, expected);
    }
}

// ============================================================================
// Integration Tests for FileChangeSource
// ============================================================================

fn channel_sink() -> (BatchSink, std_mpsc::Receiver<ChangeBatch>) {
    let (tx, rx) = std_mpsc::channel();
    let tx = parking_lot::Mutex::new(tx);
    let sink: BatchSink = Arc::new(move |batch: ChangeBatch| {
        let _ = tx.lock().send(batch);
    });
    (sink, rx)
}

fn test_config() -> FileChangeSourceConfig {
    FileChangeSourceConfig {
        quiet_period: Duration::from_millis(100),
        poll_interval: Duration::from_millis(50),
        use_polling: true,
        trigger_file: None,
    }
}

#[test]
fn test_change_source_emits_batch() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    let resource = WatchedResource::new(root.clone(), ResourceFilter::allow_all());

    let (sink, receiver) = channel_sink();
    let mut source = FileChangeSource::new(test_config());
    source.start(&[resource], sink).unwrap();
    assert!(source.is_active());

    // Let the polling watcher take its first snapshot
    std::thread::sleep(Duration::from_millis(200));
    std::fs::write(root.join("main.rs"), "fn main() {}").unwrap();

    let batch = receiver.recv_timeout(Duration::from_secs(5));
    source.stop();

    let batch = batch.expect("expected a change batch");
    assert!(batch.contains(&root.join("main.rs")));
}

#[test]
fn test_change_source_respects_exclusions() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    std::fs::create_dir_all(root.join("static")).unwrap();
    let filter = ResourceFilter::new(vec!["static/**".to_string()], vec![]).unwrap();
    let resource = WatchedResource::new(root.clone(), filter);

    let (sink, receiver) = channel_sink();
    let mut source = FileChangeSource::new(test_config());
    source.start(&[resource], sink).unwrap();

    std::thread::sleep(Duration::from_millis(200));
    std::fs::write(root.join("static").join("app.css"), "body {}").unwrap();

    let result = receiver.recv_timeout(Duration::from_millis(800));
    source.stop();

    assert!(result.is_err(), "excluded change must not produce a batch");
}

#[test]
fn test_stop_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let resource = WatchedResource::new(temp_dir.path(), ResourceFilter::allow_all());
    let (sink, _receiver) = channel_sink();

    let mut source = FileChangeSource::new(test_config());
    source.stop();
    source.start(&[resource], sink).unwrap();
    source.stop();
    source.stop();
    assert!(!source.is_active());
}

#[test]
fn test_stop_discards_buffered_changes() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    let resource = WatchedResource::new(root.clone(), ResourceFilter::allow_all());

    let (sink, receiver) = channel_sink();
    let config = FileChangeSourceConfig {
        quiet_period: Duration::from_secs(2),
        ..test_config()
    };
    let mut source = FileChangeSource::new(config);
    source.start(&[resource], sink).unwrap();

    std::thread::sleep(Duration::from_millis(200));
    std::fs::write(root.join("main.rs"), "fn main() {}").unwrap();
    // Seen by the poller, still inside the quiet window
    std::thread::sleep(Duration::from_millis(300));
    source.stop();

    let result = receiver.recv_timeout(Duration::from_secs(3));
    assert!(result.is_err(), "stop must discard buffered changes");
}

#[test]
fn test_missing_root_is_skipped() {
    let resource = WatchedResource::new("/definitely/not/here", ResourceFilter::allow_all());
    let (sink, _receiver) = channel_sink();

    let mut source = FileChangeSource::new(test_config());
    assert!(source.start(&[resource], sink).is_ok());
    source.stop();
}
