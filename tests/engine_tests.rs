//! Tests for the embedded Engine
//!
//! These tests verify:
//! - Namespace lifecycle (create, drop, rediscovery at open)
//! - Transactions: read-your-writes, snapshot isolation, conflicts, rollback
//! - Iterators: bounds, seeking, merging uncommitted writes, closing
//! - Comparators that become ready after open
//! - Crash recovery from WAL and WAL compaction
//! - Engine lifecycle (open/close)

use std::cmp::Ordering;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;

use hgindex::config::{Config, WalSyncStrategy};
use hgindex::engine::{BytewiseComparator, Engine, EngineIterator, KeyComparator, NamespaceDescriptor};
use hgindex::error::EngineError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(temp_dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .wal_compaction_threshold(0)
        .build()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(&test_config(&temp_dir), Vec::new()).unwrap();
    (temp_dir, engine)
}

fn bytewise() -> Arc<dyn KeyComparator> {
    Arc::new(BytewiseComparator)
}

/// Orders keys backwards
struct ReverseComparator;

impl KeyComparator for ReverseComparator {
    fn name(&self) -> &str {
        "reverse"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        b.cmp(a)
    }
}

/// Bytewise comparator that can be switched on after open
#[derive(Default)]
struct LateComparator {
    ready: AtomicBool,
}

impl KeyComparator for LateComparator {
    fn name(&self) -> &str {
        "late"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(AtomicOrdering::Acquire)
    }
}

fn collect_forward(iter: &EngineIterator) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    iter.seek_to_first().unwrap();
    while let Some(key) = iter.key() {
        keys.push(key.to_vec());
        iter.next().unwrap();
    }
    keys
}

fn fill(engine: &Engine, name: &str, keys: &[&str]) {
    let ns = engine.namespace(name).unwrap();
    let tx = engine.begin().unwrap();
    for key in keys {
        tx.put(&ns, key.as_bytes(), b"v").unwrap();
    }
    tx.commit().unwrap();
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");
    let config = Config::builder().data_dir(&data_dir).build();

    let _engine = Engine::open(&config, Vec::new()).unwrap();

    assert!(data_dir.exists());
    assert!(data_dir.join("wal.log").exists());
}

#[test]
fn test_engine_open_missing_directory_without_create() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path().join("absent"))
        .create_if_missing(false)
        .build();

    let result = Engine::open(&config, Vec::new());
    assert!(matches!(result, Err(EngineError::Io(_))));
}

#[test]
fn test_engine_close_rejects_new_work() {
    let (_temp, engine) = setup_temp_engine();
    engine.close().unwrap();
    engine.close().unwrap();

    assert!(engine.is_closed());
    assert!(matches!(engine.begin(), Err(EngineError::EngineClosed)));
    assert!(matches!(
        engine.create_namespace("ns", bytewise()),
        Err(EngineError::EngineClosed)
    ));
}

// =============================================================================
// Namespace Tests
// =============================================================================

#[test]
fn test_create_namespace_twice_fails() {
    let (_temp, engine) = setup_temp_engine();
    engine.create_namespace("ns", bytewise()).unwrap();

    let result = engine.create_namespace("ns", bytewise());
    assert!(matches!(result, Err(EngineError::NamespaceExists(_))));
}

#[test]
fn test_namespace_names_in_creation_order() {
    let (_temp, engine) = setup_temp_engine();
    engine.create_namespace("b", bytewise()).unwrap();
    engine.create_namespace("a", bytewise()).unwrap();
    engine.create_namespace("c", bytewise()).unwrap();

    assert_eq!(engine.namespace_names(), vec!["b", "a", "c"]);
}

#[test]
fn test_namespaces_are_isolated() {
    let (_temp, engine) = setup_temp_engine();
    let a = engine.create_namespace("a", bytewise()).unwrap();
    let b = engine.create_namespace("b", bytewise()).unwrap();

    let tx = engine.begin().unwrap();
    tx.put(&a, b"key", b"in-a").unwrap();
    tx.commit().unwrap();

    let tx = engine.begin().unwrap();
    assert_eq!(tx.get(&a, b"key").unwrap().unwrap().as_ref(), b"in-a");
    assert!(tx.get(&b, b"key").unwrap().is_none());
}

#[test]
fn test_drop_namespace() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    fill(&engine, "ns", &["k"]);

    engine.drop_namespace(&ns).unwrap();

    assert!(ns.is_dropped());
    assert!(engine.namespace("ns").is_none());
    let tx = engine.begin().unwrap();
    assert!(matches!(tx.get(&ns, b"k"), Err(EngineError::NamespaceDropped(_))));
    assert!(matches!(engine.drop_namespace(&ns), Err(EngineError::NamespaceDropped(_))));
}

#[test]
fn test_drop_then_recreate_starts_empty() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    fill(&engine, "ns", &["k"]);
    engine.drop_namespace(&ns).unwrap();

    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    let tx = engine.begin().unwrap();
    assert!(tx.get(&ns, b"k").unwrap().is_none());
}

#[test]
fn test_commit_into_dropped_namespace_fails() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();

    let tx = engine.begin().unwrap();
    tx.put(&ns, b"k", b"v").unwrap();
    engine.drop_namespace(&ns).unwrap();

    assert!(matches!(tx.commit(), Err(EngineError::NamespaceDropped(_))));
}

// =============================================================================
// Transaction Tests
// =============================================================================

#[test]
fn test_put_get_delete() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();

    let tx = engine.begin().unwrap();
    tx.put(&ns, b"k", b"v1").unwrap();
    tx.commit().unwrap();

    let tx = engine.begin().unwrap();
    assert_eq!(tx.get(&ns, b"k").unwrap().unwrap().as_ref(), b"v1");
    tx.delete(&ns, b"k").unwrap();
    tx.commit().unwrap();

    let tx = engine.begin().unwrap();
    assert!(tx.get(&ns, b"k").unwrap().is_none());
}

#[test]
fn test_read_your_writes() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    fill(&engine, "ns", &["committed"]);

    let tx = engine.begin().unwrap();
    tx.put(&ns, b"fresh", b"x").unwrap();
    tx.delete(&ns, b"committed").unwrap();

    assert_eq!(tx.get(&ns, b"fresh").unwrap().unwrap().as_ref(), b"x");
    assert!(tx.get(&ns, b"committed").unwrap().is_none());

    let other = engine.begin().unwrap();
    assert!(other.get(&ns, b"fresh").unwrap().is_none());
    assert!(other.get(&ns, b"committed").unwrap().is_some());
}

#[test]
fn test_snapshot_isolation() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    fill(&engine, "ns", &["k"]);

    let reader = engine.begin().unwrap();

    let writer = engine.begin().unwrap();
    writer.put(&ns, b"k", b"new").unwrap();
    writer.put(&ns, b"other", b"new").unwrap();
    writer.commit().unwrap();

    assert_eq!(reader.get(&ns, b"k").unwrap().unwrap().as_ref(), b"v");
    assert!(reader.get(&ns, b"other").unwrap().is_none());
    assert_eq!(collect_forward(&reader.iterator(&ns, Bound::Unbounded, Bound::Unbounded).unwrap()), vec![b"k".to_vec()]);
}

#[test]
fn test_write_conflict() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();

    let first = engine.begin().unwrap();
    let second = engine.begin().unwrap();
    first.put(&ns, b"k", b"first").unwrap();
    second.put(&ns, b"k", b"second").unwrap();

    second.commit().unwrap();
    assert!(matches!(first.commit(), Err(EngineError::Conflict { .. })));

    let tx = engine.begin().unwrap();
    assert_eq!(tx.get(&ns, b"k").unwrap().unwrap().as_ref(), b"second");
}

#[test]
fn test_disjoint_writes_do_not_conflict() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();

    let first = engine.begin().unwrap();
    let second = engine.begin().unwrap();
    first.put(&ns, b"a", b"1").unwrap();
    second.put(&ns, b"b", b"2").unwrap();

    second.commit().unwrap();
    first.commit().unwrap();
}

#[test]
fn test_rollback_discards_writes() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();

    let tx = engine.begin().unwrap();
    tx.put(&ns, b"k", b"v").unwrap();
    tx.rollback().unwrap();

    {
        let dropped = engine.begin().unwrap();
        dropped.put(&ns, b"j", b"v").unwrap();
    }

    let tx = engine.begin().unwrap();
    assert!(tx.get(&ns, b"k").unwrap().is_none());
    assert!(tx.get(&ns, b"j").unwrap().is_none());
}

#[test]
fn test_sequence_advances_per_commit() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    let start = engine.last_sequence();

    fill(&engine, "ns", &["a"]);
    fill(&engine, "ns", &["b"]);
    // Read-only commits leave the sequence alone
    engine.begin().unwrap().commit().unwrap();

    assert_eq!(engine.last_sequence(), start + 2);
    let tx = engine.begin().unwrap();
    assert_eq!(tx.snapshot(), start + 2);
    assert!(tx.is_active());
    assert!(tx.get(&ns, b"a").unwrap().is_some());
}

#[test]
fn test_concurrent_commits() {
    let (_temp, engine) = setup_temp_engine();
    engine.create_namespace("ns", bytewise()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = engine.clone();
            thread::spawn(move || {
                let ns = engine.namespace("ns").unwrap();
                for i in 0..25 {
                    let tx = engine.begin().unwrap();
                    tx.put(&ns, format!("t{}-{:02}", t, i).as_bytes(), b"v").unwrap();
                    tx.commit().unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let ns = engine.namespace("ns").unwrap();
    let tx = engine.begin().unwrap();
    let keys = collect_forward(&tx.iterator(&ns, Bound::Unbounded, Bound::Unbounded).unwrap());
    assert_eq!(keys.len(), 100);
    assert_eq!(engine.last_sequence(), 100);
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iterator_respects_bounds() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    fill(&engine, "ns", &["a", "b", "c", "d", "e"]);

    let tx = engine.begin().unwrap();
    let iter = tx
        .iterator(&ns, Bound::Included(b"b".to_vec()), Bound::Excluded(b"e".to_vec()))
        .unwrap();

    assert_eq!(collect_forward(&iter), vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);

    iter.seek_to_last().unwrap();
    assert_eq!(iter.key().unwrap().as_ref(), b"d");
    iter.prev().unwrap();
    assert_eq!(iter.key().unwrap().as_ref(), b"c");
}

#[test]
fn test_iterator_seek() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    fill(&engine, "ns", &["a", "c", "e"]);

    let tx = engine.begin().unwrap();
    let iter = tx.iterator(&ns, Bound::Unbounded, Bound::Unbounded).unwrap();
    assert!(!iter.valid());

    iter.seek(Bound::Included(&b"b"[..])).unwrap();
    assert_eq!(iter.key().unwrap().as_ref(), b"c");
    iter.seek(Bound::Excluded(&b"c"[..])).unwrap();
    assert_eq!(iter.key().unwrap().as_ref(), b"e");
    iter.seek_for_prev(Bound::Included(&b"d"[..])).unwrap();
    assert_eq!(iter.key().unwrap().as_ref(), b"c");
    iter.seek_for_prev(Bound::Excluded(&b"c"[..])).unwrap();
    assert_eq!(iter.key().unwrap().as_ref(), b"a");

    iter.prev().unwrap();
    assert!(!iter.valid());
    iter.seek(Bound::Excluded(&b"e"[..])).unwrap();
    assert!(iter.entry().is_none());
}

#[test]
fn test_iterator_seek_outside_bounds_is_clamped() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    fill(&engine, "ns", &["a", "b", "c"]);

    let tx = engine.begin().unwrap();
    let iter = tx
        .iterator(&ns, Bound::Included(b"b".to_vec()), Bound::Unbounded)
        .unwrap();
    iter.seek(Bound::Included(&b"a"[..])).unwrap();
    assert_eq!(iter.key().unwrap().as_ref(), b"b");
    iter.seek_for_prev(Bound::Included(&b"a"[..])).unwrap();
    assert!(!iter.valid());
}

#[test]
fn test_iterator_empty_and_inverted_ranges() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    fill(&engine, "ns", &["a", "b"]);

    let tx = engine.begin().unwrap();
    let inverted = tx
        .iterator(&ns, Bound::Included(b"z".to_vec()), Bound::Included(b"a".to_vec()))
        .unwrap();
    assert!(collect_forward(&inverted).is_empty());

    let point = tx
        .iterator(&ns, Bound::Excluded(b"a".to_vec()), Bound::Excluded(b"a".to_vec()))
        .unwrap();
    assert!(collect_forward(&point).is_empty());
}

#[test]
fn test_iterator_merges_uncommitted_writes() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    fill(&engine, "ns", &["a", "c", "e"]);

    let tx = engine.begin().unwrap();
    tx.put(&ns, b"b", b"own").unwrap();
    tx.put(&ns, b"c", b"overwritten").unwrap();
    tx.delete(&ns, b"e").unwrap();

    let iter = tx.iterator(&ns, Bound::Unbounded, Bound::Unbounded).unwrap();
    assert_eq!(collect_forward(&iter), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

    iter.seek(Bound::Included(&b"c"[..])).unwrap();
    assert_eq!(iter.value().unwrap().as_ref(), b"overwritten");

    // Writes after creation are not seen by the existing iterator
    tx.put(&ns, b"f", b"late").unwrap();
    iter.seek_to_last().unwrap();
    assert_eq!(iter.key().unwrap().as_ref(), b"c");
}

#[test]
fn test_iterator_uses_namespace_comparator() {
    let (_temp, engine) = setup_temp_engine();
    engine.create_namespace("rev", Arc::new(ReverseComparator)).unwrap();
    fill(&engine, "rev", &["a", "b", "c"]);

    let ns = engine.namespace("rev").unwrap();
    let tx = engine.begin().unwrap();
    let iter = tx.iterator(&ns, Bound::Unbounded, Bound::Unbounded).unwrap();
    assert_eq!(collect_forward(&iter), vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
}

#[test]
fn test_closed_iterator() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    fill(&engine, "ns", &["a"]);

    let tx = engine.begin().unwrap();
    let iter = tx.iterator(&ns, Bound::Unbounded, Bound::Unbounded).unwrap();
    iter.seek_to_first().unwrap();
    assert!(iter.valid());

    iter.close();
    iter.close();

    assert!(iter.is_closed());
    assert!(!iter.valid());
    assert!(iter.key().is_none());
    assert!(matches!(iter.next(), Err(EngineError::IteratorClosed)));
    assert!(matches!(iter.seek_to_first(), Err(EngineError::IteratorClosed)));
}

// =============================================================================
// Estimation Tests
// =============================================================================

#[test]
fn test_approximate_range() {
    let (_temp, engine) = setup_temp_engine();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    fill(&engine, "ns", &["a", "b", "c", "d"]);

    let all = engine
        .approximate_range(&ns, Bound::Unbounded, Bound::Unbounded)
        .unwrap();
    assert_eq!(all.rows, 4);
    assert_eq!(all.bytes, 8);

    let some = engine
        .approximate_range(&ns, Bound::Included(&b"b"[..]), Bound::Excluded(&b"d"[..]))
        .unwrap();
    assert_eq!(some.rows, 2);

    let none = engine
        .approximate_range(&ns, Bound::Included(&b"x"[..]), Bound::Included(&b"a"[..]))
        .unwrap();
    assert_eq!(none.rows, 0);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_reopen_recovers_committed_data() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    {
        let engine = Engine::open(&config, Vec::new()).unwrap();
        let ns = engine.create_namespace("ns", bytewise()).unwrap();
        let tx = engine.begin().unwrap();
        tx.put(&ns, b"k1", b"v1").unwrap();
        tx.put(&ns, b"k2", b"v2").unwrap();
        tx.commit().unwrap();
        let tx = engine.begin().unwrap();
        tx.delete(&ns, b"k1").unwrap();
        tx.commit().unwrap();

        let uncommitted = engine.begin().unwrap();
        uncommitted.put(&ns, b"k3", b"lost").unwrap();
    }

    let engine = Engine::open(&config, vec![NamespaceDescriptor::new("ns", bytewise())]).unwrap();
    let ns = engine.namespace("ns").unwrap();
    let tx = engine.begin().unwrap();

    assert!(tx.get(&ns, b"k1").unwrap().is_none());
    assert_eq!(tx.get(&ns, b"k2").unwrap().unwrap().as_ref(), b"v2");
    assert!(tx.get(&ns, b"k3").unwrap().is_none());
    assert_eq!(engine.last_sequence(), 2);
}

#[test]
fn test_reopen_without_descriptor_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    {
        let engine = Engine::open(&config, Vec::new()).unwrap();
        engine.create_namespace("ns", bytewise()).unwrap();
    }

    let result = Engine::open(&config, Vec::new());
    assert!(matches!(result, Err(EngineError::MissingDescriptor(name)) if name == "ns"));
}

#[test]
fn test_list_namespaces_without_opening() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    assert!(Engine::list_namespaces(temp_dir.path()).unwrap().is_empty());
    {
        let engine = Engine::open(&config, Vec::new()).unwrap();
        engine.create_namespace("one", bytewise()).unwrap();
        let two = engine.create_namespace("two", bytewise()).unwrap();
        engine.create_namespace("three", bytewise()).unwrap();
        engine.drop_namespace(&two).unwrap();
    }

    assert_eq!(Engine::list_namespaces(temp_dir.path()).unwrap(), vec!["one", "three"]);
}

#[test]
fn test_comparator_ready_after_open() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    {
        let engine = Engine::open(&config, Vec::new()).unwrap();
        engine.create_namespace("ns", bytewise()).unwrap();
        fill(&engine, "ns", &["b", "a"]);
    }

    let late = Arc::new(LateComparator::default());
    let engine = Engine::open(&config, vec![NamespaceDescriptor::new("ns", late.clone())]).unwrap();
    let ns = engine.namespace("ns").unwrap();

    let tx = engine.begin().unwrap();
    assert!(matches!(tx.get(&ns, b"a"), Err(EngineError::ComparatorNotReady(_))));
    assert!(matches!(tx.put(&ns, b"c", b"v"), Err(EngineError::ComparatorNotReady(_))));
    assert!(matches!(
        engine.approximate_range(&ns, Bound::Unbounded, Bound::Unbounded),
        Err(EngineError::ComparatorNotReady(_))
    ));

    late.ready.store(true, AtomicOrdering::Release);

    assert!(tx.get(&ns, b"a").unwrap().is_some());
    let iter = tx.iterator(&ns, Bound::Unbounded, Bound::Unbounded).unwrap();
    assert_eq!(collect_forward(&iter), vec![b"a".to_vec(), b"b".to_vec()]);
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_compact_shrinks_wal_and_keeps_data() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    {
        let engine = Engine::open(&config, Vec::new()).unwrap();
        let ns = engine.create_namespace("ns", bytewise()).unwrap();
        for i in 0..50 {
            let tx = engine.begin().unwrap();
            tx.put(&ns, b"hot", format!("value-{}", i).as_bytes()).unwrap();
            tx.commit().unwrap();
        }
        fill(&engine, "ns", &["gone"]);
        let tx = engine.begin().unwrap();
        tx.delete(&ns, b"gone").unwrap();
        tx.commit().unwrap();

        let before = engine.wal_size();
        engine.compact().unwrap();
        assert!(engine.wal_size() < before);

        // Still writable after the log was swapped
        fill(&engine, "ns", &["after"]);
    }

    let engine = Engine::open(&config, vec![NamespaceDescriptor::new("ns", bytewise())]).unwrap();
    let ns = engine.namespace("ns").unwrap();
    let tx = engine.begin().unwrap();
    assert_eq!(tx.get(&ns, b"hot").unwrap().unwrap().as_ref(), b"value-49");
    assert!(tx.get(&ns, b"gone").unwrap().is_none());
    assert!(tx.get(&ns, b"after").unwrap().is_some());
}

#[test]
fn test_compaction_triggered_by_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 16 })
        .wal_compaction_threshold(2048)
        .build();
    let engine = Engine::open(&config, Vec::new()).unwrap();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();

    for i in 0..200 {
        let tx = engine.begin().unwrap();
        tx.put(&ns, b"key", format!("value-{:03}", i).as_bytes()).unwrap();
        tx.commit().unwrap();
    }

    assert!(engine.wal_size() < 4096);
    let tx = engine.begin().unwrap();
    assert_eq!(tx.get(&ns, b"key").unwrap().unwrap().as_ref(), b"value-199");
}

#[test]
fn test_failed_automatic_compaction_keeps_commit() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .wal_compaction_threshold(1)
        .build();
    let engine = Engine::open(&config, Vec::new()).unwrap();
    let ns = engine.create_namespace("ns", bytewise()).unwrap();
    // Blocks the temporary file compaction writes to
    std::fs::create_dir(temp_dir.path().join("wal.log.compact")).unwrap();

    let tx = engine.begin().unwrap();
    tx.put(&ns, b"k", b"v").unwrap();
    tx.commit().unwrap();

    assert_eq!(engine.last_sequence(), 1);
    assert!(engine.compact().is_err());
    let tx = engine.begin().unwrap();
    assert_eq!(tx.get(&ns, b"k").unwrap().unwrap().as_ref(), b"v");
    drop(tx);
    engine.close().unwrap();

    let engine = Engine::open(&config, vec![NamespaceDescriptor::new("ns", bytewise())]).unwrap();
    let ns = engine.namespace("ns").unwrap();
    let tx = engine.begin().unwrap();
    assert_eq!(tx.get(&ns, b"k").unwrap().unwrap().as_ref(), b"v");
}

#[test]
fn test_compact_keeps_pending_namespaces() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    {
        let engine = Engine::open(&config, Vec::new()).unwrap();
        engine.create_namespace("ns", bytewise()).unwrap();
        fill(&engine, "ns", &["a", "b"]);
    }
    {
        // Comparator never becomes ready in this session
        let late: Arc<dyn KeyComparator> = Arc::new(LateComparator::default());
        let engine = Engine::open(&config, vec![NamespaceDescriptor::new("ns", late)]).unwrap();
        engine.compact().unwrap();
    }

    let engine = Engine::open(&config, vec![NamespaceDescriptor::new("ns", bytewise())]).unwrap();
    let ns = engine.namespace("ns").unwrap();
    let iter = engine
        .begin()
        .unwrap()
        .iterator(&ns, Bound::Unbounded, Bound::Unbounded)
        .unwrap();
    assert_eq!(collect_forward(&iter), vec![b"a".to_vec(), b"b".to_vec()]);
}
