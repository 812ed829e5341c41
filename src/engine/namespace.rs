//! Namespaces: independently ordered partitions of the engine key space
//!
//! ## Storage
//! ```text
//! BTreeMap<OrderedKey, Versions>
//!   OrderedKey  = raw key bytes + the namespace comparator
//!   Versions    = [(seq, Some(value) | None = tombstone)]  ascending seq
//! ```
//! Records replayed from the WAL are held unordered (`Pending`) until the
//! comparator is ready, then sorted into the map on first use.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use super::{KeyComparator, RangeEstimate};
use crate::error::{EngineError, EngineResult};

/// Committed versions of one key, oldest first
pub(crate) type Versions = Vec<(u64, Option<Bytes>)>;

/// Key bytes carrying the comparator that orders them
#[derive(Clone)]
pub(crate) struct OrderedKey {
    bytes: Bytes,
    comparator: Arc<dyn KeyComparator>,
}

impl OrderedKey {
    pub(crate) fn new(bytes: Bytes, comparator: Arc<dyn KeyComparator>) -> Self {
        Self { bytes, comparator }
    }

    pub(crate) fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator.compare(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for OrderedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.bytes)
    }
}

/// True when no key can satisfy both bounds.
///
/// `BTreeMap::range` panics on such bounds, so every range lookup is
/// checked first.
pub(crate) fn is_empty_range(lower: &Bound<OrderedKey>, upper: &Bound<OrderedKey>) -> bool {
    let (lo, lo_inclusive) = match lower {
        Bound::Included(k) => (k, true),
        Bound::Excluded(k) => (k, false),
        Bound::Unbounded => return false,
    };
    let (hi, hi_inclusive) = match upper {
        Bound::Included(k) => (k, true),
        Bound::Excluded(k) => (k, false),
        Bound::Unbounded => return false,
    };
    match lo.cmp(hi) {
        Ordering::Greater => true,
        Ordering::Equal => !(lo_inclusive && hi_inclusive),
        Ordering::Less => false,
    }
}

/// Value of the newest version at or below `snapshot`
fn visible(versions: &Versions, snapshot: u64) -> Option<Bytes> {
    versions
        .iter()
        .rev()
        .find(|(seq, _)| *seq <= snapshot)
        .and_then(|(_, value)| value.clone())
}

/// Drop versions no snapshot at or above `oldest` can see
fn prune(versions: &mut Versions, oldest: u64) {
    if let Some(pos) = versions.iter().rposition(|(seq, _)| *seq <= oldest) {
        versions.drain(..pos);
    }
}

enum NamespaceData {
    /// Replayed writes in commit order, waiting for a ready comparator
    Pending(Vec<(u64, Bytes, Option<Bytes>)>),
    Ready(BTreeMap<OrderedKey, Versions>),
}

/// Handle to one namespace of an open engine
pub struct Namespace {
    id: u32,
    name: String,
    comparator: Arc<dyn KeyComparator>,
    dropped: AtomicBool,
    data: RwLock<NamespaceData>,
}

impl Namespace {
    pub(crate) fn new(
        id: u32,
        name: String,
        comparator: Arc<dyn KeyComparator>,
        replayed: Vec<(u64, Bytes, Option<Bytes>)>,
    ) -> Self {
        Self {
            id,
            name,
            comparator,
            dropped: AtomicBool::new(false),
            data: RwLock::new(NamespaceData::Pending(replayed)),
        }
    }

    /// Identifier used in WAL records
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comparator(&self) -> &Arc<dyn KeyComparator> {
        &self.comparator
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn mark_dropped(&self) {
        self.dropped.store(true, AtomicOrdering::Release);
        *self.data.write() = NamespaceData::Pending(Vec::new());
    }

    pub(crate) fn ordered(&self, bytes: Bytes) -> OrderedKey {
        OrderedKey::new(bytes, Arc::clone(&self.comparator))
    }

    /// Fail unless the namespace is live and its comparator usable, sorting
    /// replayed records into place the first time this succeeds.
    pub(crate) fn ensure_ready(&self) -> EngineResult<()> {
        if self.is_dropped() {
            return Err(EngineError::NamespaceDropped(self.name.clone()));
        }
        if !self.comparator.is_ready() {
            return Err(EngineError::ComparatorNotReady(self.name.clone()));
        }
        if matches!(*self.data.read(), NamespaceData::Ready(_)) {
            return Ok(());
        }

        let mut data = self.data.write();
        if let NamespaceData::Pending(replayed) = &mut *data {
            let replayed = std::mem::take(replayed);
            let mut map: BTreeMap<OrderedKey, Versions> = BTreeMap::new();
            for (seq, key, value) in replayed {
                let versions = map.entry(self.ordered(key)).or_default();
                versions.clear();
                versions.push((seq, value));
            }
            map.retain(|_, versions| matches!(versions.last(), Some((_, Some(_)))));

            debug!(namespace = %self.name, records = map.len(), "namespace activated");
            *data = NamespaceData::Ready(map);
        }
        Ok(())
    }

    pub(crate) fn get_at(&self, key: &OrderedKey, snapshot: u64) -> Option<Bytes> {
        match &*self.data.read() {
            NamespaceData::Ready(map) => map.get(key).and_then(|versions| visible(versions, snapshot)),
            NamespaceData::Pending(_) => None,
        }
    }

    /// Sequence number of the newest committed version of `key`
    pub(crate) fn latest_seq(&self, key: &OrderedKey) -> Option<u64> {
        match &*self.data.read() {
            NamespaceData::Ready(map) => map.get(key).and_then(|versions| versions.last()).map(|(seq, _)| *seq),
            NamespaceData::Pending(_) => None,
        }
    }

    /// Install a committed write, discarding versions older than `oldest`
    pub(crate) fn apply(&self, seq: u64, key: OrderedKey, value: Option<Bytes>, oldest: u64) {
        match &mut *self.data.write() {
            NamespaceData::Ready(map) => {
                let versions = map.entry(key).or_default();
                prune(versions, oldest);
                versions.push((seq, value));
            }
            NamespaceData::Pending(replayed) => replayed.push((seq, key.bytes.clone(), value)),
        }
    }

    /// First (or last, when `forward` is false) key in the range visible at
    /// `snapshot`, skipping keys for which `skip` returns true.
    pub(crate) fn find_visible(
        &self,
        lower: &Bound<OrderedKey>,
        upper: &Bound<OrderedKey>,
        snapshot: u64,
        forward: bool,
        skip: impl Fn(&OrderedKey) -> bool,
    ) -> Option<(Bytes, Bytes)> {
        if is_empty_range(lower, upper) {
            return None;
        }
        let data = self.data.read();
        let NamespaceData::Ready(map) = &*data else {
            return None;
        };

        let hit = |(key, versions): (&OrderedKey, &Versions)| {
            if skip(key) {
                return None;
            }
            visible(versions, snapshot).map(|value| (key.bytes.clone(), value))
        };
        let mut range = map.range((lower.clone(), upper.clone()));
        if forward {
            range.find_map(hit)
        } else {
            range.rev().find_map(hit)
        }
    }

    /// Rows and bytes of the latest committed records in the range
    pub(crate) fn estimate(&self, lower: &Bound<OrderedKey>, upper: &Bound<OrderedKey>) -> RangeEstimate {
        let mut estimate = RangeEstimate::default();
        if is_empty_range(lower, upper) {
            return estimate;
        }
        if let NamespaceData::Ready(map) = &*self.data.read() {
            for (key, versions) in map.range((lower.clone(), upper.clone())) {
                if let Some((_, Some(value))) = versions.last() {
                    estimate.rows += 1;
                    estimate.bytes += (key.bytes.len() + value.len()) as u64;
                }
            }
        }
        estimate
    }

    /// Latest live records, dropping history no snapshot at or above
    /// `oldest` can still observe.
    pub(crate) fn live_records(&self, oldest: u64) -> Vec<(Bytes, Bytes)> {
        match &mut *self.data.write() {
            NamespaceData::Ready(map) => {
                map.retain(|_, versions| {
                    prune(versions, oldest);
                    !matches!(versions.as_slice(), [(seq, None)] if *seq <= oldest)
                });
                map.iter()
                    .filter_map(|(key, versions)| match versions.last() {
                        Some((_, Some(value))) => Some((key.bytes.clone(), value.clone())),
                        _ => None,
                    })
                    .collect()
            }
            NamespaceData::Pending(replayed) => {
                let mut order = Vec::new();
                let mut latest: HashMap<Bytes, Option<Bytes>> = HashMap::new();
                for (_, key, value) in replayed.iter() {
                    if latest.insert(key.clone(), value.clone()).is_none() {
                        order.push(key.clone());
                    }
                }
                order
                    .into_iter()
                    .filter_map(|key| match latest.remove(&key) {
                        Some(Some(value)) => Some((key, value)),
                        _ => None,
                    })
                    .collect()
            }
        }
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("comparator", &self.comparator.name())
            .field("dropped", &self.is_dropped())
            .finish()
    }
}
