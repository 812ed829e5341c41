//! The engine handle: open/recovery, namespace lifecycle, commit pipeline

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::namespace::{Namespace, OrderedKey};
use super::transaction::WriteSet;
use super::{KeyComparator, Transaction};
use crate::config::{Config, WalSyncStrategy};
use crate::error::{EngineError, EngineResult};
use crate::wal::{Record, WalEntry, WalReader, WalRecovery, WalWriter, WriteOp};

const WAL_FILE: &str = "wal.log";
const WAL_COMPACT_FILE: &str = "wal.log.compact";

/// A namespace to open together with the comparator that orders it
#[derive(Clone)]
pub struct NamespaceDescriptor {
    pub name: String,
    pub comparator: Arc<dyn KeyComparator>,
}

impl NamespaceDescriptor {
    pub fn new(name: impl Into<String>, comparator: Arc<dyn KeyComparator>) -> Self {
        Self {
            name: name.into(),
            comparator,
        }
    }
}

/// Size estimate for a key range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeEstimate {
    pub rows: u64,
    pub bytes: u64,
}

/// Namespaces rebuilt from the WAL: id -> (name, writes in commit order)
type Replayed = BTreeMap<u32, (String, Vec<(u64, Bytes, Option<Bytes>)>)>;

fn replay(entries: impl IntoIterator<Item = WalEntry>) -> (Replayed, u64) {
    let mut namespaces: Replayed = BTreeMap::new();
    let mut last_seq = 0;

    for entry in entries {
        match entry.record {
            Record::CreateNamespace { id, name } => {
                namespaces.insert(id, (name, Vec::new()));
            }
            Record::DropNamespace { id } => {
                namespaces.remove(&id);
            }
            Record::Commit { seq, writes } => {
                last_seq = last_seq.max(seq);
                for write in writes {
                    if let Some((_, records)) = namespaces.get_mut(&write.namespace) {
                        records.push((seq, Bytes::from(write.key), write.value.map(Bytes::from)));
                    }
                }
            }
        }
    }

    (namespaces, last_seq)
}

struct NamespaceTable {
    by_name: HashMap<String, Arc<Namespace>>,
    next_id: u32,
}

pub(crate) struct EngineInner {
    data_dir: PathBuf,
    sync_strategy: WalSyncStrategy,
    compaction_threshold: u64,
    /// Held for every WAL append; also serialises commits
    wal: Mutex<WalWriter>,
    namespaces: RwLock<NamespaceTable>,
    /// Sequence number of the newest visible commit
    last_seq: AtomicU64,
    /// Pinned snapshot -> number of transactions reading at it
    snapshots: Mutex<BTreeMap<u64, usize>>,
    closed: AtomicBool,
}

impl EngineInner {
    pub(crate) fn check_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::EngineClosed);
        }
        Ok(())
    }

    pub(crate) fn release_snapshot(&self, seq: u64) {
        let mut snapshots = self.snapshots.lock();
        if let Some(count) = snapshots.get_mut(&seq) {
            *count -= 1;
            if *count == 0 {
                snapshots.remove(&seq);
            }
        }
    }

    /// Oldest snapshot any reader may still use
    fn oldest_snapshot(&self) -> u64 {
        let last = self.last_seq.load(Ordering::Acquire);
        self.snapshots
            .lock()
            .keys()
            .next()
            .copied()
            .map_or(last, |pinned| pinned.min(last))
    }

    pub(crate) fn commit(&self, snapshot: u64, writes: BTreeMap<u32, WriteSet>) -> EngineResult<u64> {
        if writes.values().all(|set| set.entries.is_empty()) {
            return Ok(self.last_seq.load(Ordering::Acquire));
        }
        self.check_open()?;
        let mut wal = self.wal.lock();

        // Step 1: optimistic conflict check
        for set in writes.values() {
            let namespace = &set.namespace;
            if namespace.is_dropped() {
                return Err(EngineError::NamespaceDropped(namespace.name().to_string()));
            }
            for key in set.entries.keys() {
                if namespace.latest_seq(key).map_or(false, |seq| seq > snapshot) {
                    warn!(namespace = %namespace.name(), snapshot, "commit conflict");
                    return Err(EngineError::Conflict {
                        namespace: namespace.name().to_string(),
                        snapshot,
                    });
                }
            }
        }

        // Step 2: write-ahead
        let seq = self.last_seq.load(Ordering::Acquire) + 1;
        let ops = writes
            .values()
            .flat_map(|set| {
                set.entries.iter().map(move |(key, value)| WriteOp {
                    namespace: set.namespace.id(),
                    key: key.bytes().to_vec(),
                    value: value.as_ref().map(|v| v.to_vec()),
                })
            })
            .collect();
        wal.append(Record::Commit { seq, writes: ops })?;

        // Step 3: apply
        let oldest = self.oldest_snapshot();
        for set in writes.into_values() {
            for (key, value) in set.entries {
                set.namespace.apply(seq, key, value, oldest);
            }
        }

        // Step 4: publish
        self.last_seq.store(seq, Ordering::Release);

        // The commit is durable and visible; a failed rewrite only delays compaction
        if self.compaction_threshold > 0 && wal.size() > self.compaction_threshold {
            if let Err(e) = self.compact_locked(&mut wal) {
                warn!(seq, error = %e, "automatic WAL compaction failed");
            }
        }
        Ok(seq)
    }

    /// Rewrite the WAL as one create + one commit per live namespace
    fn compact_locked(&self, wal: &mut WalWriter) -> EngineResult<()> {
        let before = wal.size();
        let wal_path = self.data_dir.join(WAL_FILE);
        let tmp_path = self.data_dir.join(WAL_COMPACT_FILE);
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let seq = self.last_seq.load(Ordering::Acquire);
        let oldest = self.oldest_snapshot();
        {
            let table = self.namespaces.read();
            let mut live: Vec<&Arc<Namespace>> = table.by_name.values().collect();
            live.sort_by_key(|ns| ns.id());

            let mut rewritten = WalWriter::open(&tmp_path, WalSyncStrategy::EveryNEntries { count: usize::MAX })?;
            for namespace in live {
                rewritten.append(Record::CreateNamespace {
                    id: namespace.id(),
                    name: namespace.name().to_string(),
                })?;
                let writes: Vec<WriteOp> = namespace
                    .live_records(oldest)
                    .into_iter()
                    .map(|(key, value)| WriteOp {
                        namespace: namespace.id(),
                        key: key.to_vec(),
                        value: Some(value.to_vec()),
                    })
                    .collect();
                if !writes.is_empty() {
                    rewritten.append(Record::Commit { seq, writes })?;
                }
            }
            rewritten.sync()?;
        }

        fs::rename(&tmp_path, &wal_path)?;
        *wal = WalWriter::open(&wal_path, self.sync_strategy)?;
        info!(before, after = wal.size(), "WAL compacted");
        Ok(())
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Err(e) = self.wal.get_mut().sync() {
            warn!(error = %e, "failed to sync WAL on drop");
        }
    }
}

/// Embedded ordered key/value engine with namespaces and snapshot
/// transactions. Cloning shares the same engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Names of the namespaces recorded under `data_dir`, in creation order,
    /// without opening the engine. Empty when there is no log yet.
    pub fn list_namespaces(data_dir: &Path) -> EngineResult<Vec<String>> {
        let wal_path = data_dir.join(WAL_FILE);
        if !wal_path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = WalReader::open(&wal_path)?;
        let mut entries = Vec::new();
        // A torn tail is repaired at open; listing stops before it.
        while let Ok(Some(entry)) = reader.next_entry() {
            entries.push(entry);
        }
        let (namespaces, _) = replay(entries);
        Ok(namespaces.into_values().map(|(name, _)| name).collect())
    }

    /// Open the engine, replaying the WAL.
    ///
    /// Every namespace found on disk needs a descriptor; descriptors naming
    /// namespaces that do not exist are ignored.
    pub fn open(config: &Config, descriptors: Vec<NamespaceDescriptor>) -> EngineResult<Self> {
        let data_dir = config.data_dir.clone();
        if !data_dir.exists() {
            if !config.create_if_missing {
                return Err(EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("data directory {} does not exist", data_dir.display()),
                )));
            }
            fs::create_dir_all(&data_dir)?;
        }

        // Step 1: recover the log
        let wal_path = data_dir.join(WAL_FILE);
        let entries = if wal_path.exists() {
            let (entries, result) = WalRecovery::recover(&wal_path)?;
            info!(
                recovered = result.entries_recovered,
                truncated = result.was_truncated,
                last_lsn = result.last_lsn,
                "WAL recovered"
            );
            entries
        } else {
            Vec::new()
        };

        // Step 2: rebuild namespaces
        let (replayed, last_seq) = replay(entries);
        let mut comparators: HashMap<String, Arc<dyn KeyComparator>> = descriptors
            .into_iter()
            .map(|d| (d.name, d.comparator))
            .collect();

        let mut by_name = HashMap::new();
        let mut next_id = 0;
        for (id, (name, records)) in replayed {
            let comparator = comparators
                .remove(&name)
                .ok_or_else(|| EngineError::MissingDescriptor(name.clone()))?;
            debug!(namespace = %name, id, records = records.len(), "namespace replayed");
            by_name.insert(name.clone(), Arc::new(Namespace::new(id, name, comparator, records)));
            next_id = next_id.max(id + 1);
        }
        for name in comparators.keys() {
            debug!(namespace = %name, "descriptor for unknown namespace ignored");
        }

        // Step 3: reopen the log for appends
        let wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;

        info!(
            data_dir = %data_dir.display(),
            namespaces = by_name.len(),
            last_seq,
            "engine opened"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                data_dir,
                sync_strategy: config.wal_sync_strategy,
                compaction_threshold: config.wal_compaction_threshold,
                wal: Mutex::new(wal),
                namespaces: RwLock::new(NamespaceTable { by_name, next_id }),
                last_seq: AtomicU64::new(last_seq),
                snapshots: Mutex::new(BTreeMap::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Create a new, empty namespace ordered by `comparator`
    pub fn create_namespace(&self, name: &str, comparator: Arc<dyn KeyComparator>) -> EngineResult<Arc<Namespace>> {
        self.inner.check_open()?;
        let mut wal = self.inner.wal.lock();
        let mut table = self.inner.namespaces.write();
        if table.by_name.contains_key(name) {
            return Err(EngineError::NamespaceExists(name.to_string()));
        }

        let id = table.next_id;
        wal.append(Record::CreateNamespace {
            id,
            name: name.to_string(),
        })?;
        table.next_id += 1;

        let namespace = Arc::new(Namespace::new(id, name.to_string(), comparator, Vec::new()));
        table.by_name.insert(name.to_string(), Arc::clone(&namespace));
        info!(namespace = %name, id, "namespace created");
        Ok(namespace)
    }

    /// Drop a namespace and every record in it
    pub fn drop_namespace(&self, namespace: &Arc<Namespace>) -> EngineResult<()> {
        self.inner.check_open()?;
        let mut wal = self.inner.wal.lock();
        let mut table = self.inner.namespaces.write();
        match table.by_name.get(namespace.name()) {
            Some(current) if Arc::ptr_eq(current, namespace) => {}
            _ if namespace.is_dropped() => {
                return Err(EngineError::NamespaceDropped(namespace.name().to_string()))
            }
            _ => return Err(EngineError::NamespaceNotFound(namespace.name().to_string())),
        }

        wal.append(Record::DropNamespace { id: namespace.id() })?;
        table.by_name.remove(namespace.name());
        namespace.mark_dropped();
        info!(namespace = %namespace.name(), "namespace dropped");
        Ok(())
    }

    /// Live namespace by name
    pub fn namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.inner.namespaces.read().by_name.get(name).cloned()
    }

    /// Names of all live namespaces, in creation order
    pub fn namespace_names(&self) -> Vec<String> {
        let table = self.inner.namespaces.read();
        let mut live: Vec<&Arc<Namespace>> = table.by_name.values().collect();
        live.sort_by_key(|ns| ns.id());
        live.into_iter().map(|ns| ns.name().to_string()).collect()
    }

    /// Start a transaction reading at the latest commit
    pub fn begin(&self) -> EngineResult<Transaction> {
        self.inner.check_open()?;
        let snapshot = {
            let mut snapshots = self.inner.snapshots.lock();
            let seq = self.inner.last_seq.load(Ordering::Acquire);
            *snapshots.entry(seq).or_insert(0) += 1;
            seq
        };
        Ok(Transaction::new(Arc::clone(&self.inner), snapshot))
    }

    /// Approximate rows and bytes committed in `(lower, upper)`
    pub fn approximate_range(
        &self,
        namespace: &Arc<Namespace>,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
    ) -> EngineResult<RangeEstimate> {
        self.inner.check_open()?;
        namespace.ensure_ready()?;
        let to_key = |bound: Bound<&[u8]>| -> Bound<OrderedKey> {
            match bound {
                Bound::Included(key) => Bound::Included(namespace.ordered(Bytes::copy_from_slice(key))),
                Bound::Excluded(key) => Bound::Excluded(namespace.ordered(Bytes::copy_from_slice(key))),
                Bound::Unbounded => Bound::Unbounded,
            }
        };
        Ok(namespace.estimate(&to_key(lower), &to_key(upper)))
    }

    /// Rewrite the WAL so it holds only live records
    pub fn compact(&self) -> EngineResult<()> {
        self.inner.check_open()?;
        let mut wal = self.inner.wal.lock();
        self.inner.compact_locked(&mut wal)
    }

    /// Current WAL size in bytes
    pub fn wal_size(&self) -> u64 {
        self.inner.wal.lock().size()
    }

    /// Sequence number of the newest commit
    pub fn last_sequence(&self) -> u64 {
        self.inner.last_seq.load(Ordering::Acquire)
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    /// Sync the WAL and refuse further work
    pub fn close(&self) -> EngineResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.wal.lock().sync()?;
        info!(data_dir = %self.inner.data_dir.display(), "engine closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
