//! Snapshot-isolated optimistic transactions
//!
//! ## Lifecycle
//! ```text
//! begin ──► pin snapshot ──► get/put/delete/iterator (buffered)
//!                                   │
//!              ┌────────────────────┴───────────────────┐
//!           commit                               rollback / drop
//!   conflict check ─► WAL ─► apply                 discard writes
//!              └────────────────────┬───────────────────┘
//!                            unpin snapshot
//! ```

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::db::EngineInner;
use super::namespace::OrderedKey;
use super::{EngineIterator, Namespace};
use crate::error::{EngineError, EngineResult};

/// Buffered writes of one transaction to one namespace
pub(crate) struct WriteSet {
    pub(crate) namespace: Arc<Namespace>,
    pub(crate) entries: BTreeMap<OrderedKey, Option<Bytes>>,
}

struct TxState {
    active: bool,
    /// Keyed by namespace id
    writes: BTreeMap<u32, WriteSet>,
}

/// A unit of work against the engine.
///
/// Reads see the snapshot taken at [`super::Engine::begin`] plus this
/// transaction's own writes. Writes become visible to others only on
/// [`Transaction::commit`]. Dropping an uncommitted transaction rolls it
/// back.
pub struct Transaction {
    engine: Arc<EngineInner>,
    snapshot: u64,
    state: Mutex<TxState>,
}

impl Transaction {
    pub(crate) fn new(engine: Arc<EngineInner>, snapshot: u64) -> Self {
        Self {
            engine,
            snapshot,
            state: Mutex::new(TxState {
                active: true,
                writes: BTreeMap::new(),
            }),
        }
    }

    /// Sequence number this transaction reads at
    pub fn snapshot(&self) -> u64 {
        self.snapshot
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Read `key`, own writes first
    pub fn get(&self, namespace: &Arc<Namespace>, key: &[u8]) -> EngineResult<Option<Bytes>> {
        self.engine.check_open()?;
        namespace.ensure_ready()?;

        let state = self.state.lock();
        if !state.active {
            return Err(EngineError::TransactionClosed);
        }
        let key = namespace.ordered(Bytes::copy_from_slice(key));
        if let Some(own) = state
            .writes
            .get(&namespace.id())
            .and_then(|set| set.entries.get(&key))
        {
            return Ok(own.clone());
        }
        Ok(namespace.get_at(&key, self.snapshot))
    }

    pub fn put(&self, namespace: &Arc<Namespace>, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write(namespace, key, Some(Bytes::copy_from_slice(value)))
    }

    pub fn delete(&self, namespace: &Arc<Namespace>, key: &[u8]) -> EngineResult<()> {
        self.write(namespace, key, None)
    }

    fn write(&self, namespace: &Arc<Namespace>, key: &[u8], value: Option<Bytes>) -> EngineResult<()> {
        self.engine.check_open()?;
        namespace.ensure_ready()?;

        let mut state = self.state.lock();
        if !state.active {
            return Err(EngineError::TransactionClosed);
        }
        let set = state.writes.entry(namespace.id()).or_insert_with(|| WriteSet {
            namespace: Arc::clone(namespace),
            entries: BTreeMap::new(),
        });
        set.entries
            .insert(namespace.ordered(Bytes::copy_from_slice(key)), value);
        Ok(())
    }

    /// Iterator over `namespace` restricted to `(lower, upper)`
    pub fn iterator(
        &self,
        namespace: &Arc<Namespace>,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
    ) -> EngineResult<EngineIterator> {
        self.engine.check_open()?;
        namespace.ensure_ready()?;

        let state = self.state.lock();
        if !state.active {
            return Err(EngineError::TransactionClosed);
        }
        let overlay = state
            .writes
            .get(&namespace.id())
            .map(|set| set.entries.clone())
            .unwrap_or_default();

        Ok(EngineIterator::new(
            Arc::clone(namespace),
            self.snapshot,
            overlay,
            lower,
            upper,
        ))
    }

    /// Make all writes durable and visible, or fail with `Conflict` if any
    /// written key was committed by someone else after the snapshot.
    pub fn commit(self) -> EngineResult<()> {
        let writes = {
            let mut state = self.state.lock();
            if !state.active {
                return Err(EngineError::TransactionClosed);
            }
            state.active = false;
            std::mem::take(&mut state.writes)
        };
        let result = self.engine.commit(self.snapshot, writes).map(|_| ());
        self.engine.release_snapshot(self.snapshot);
        result
    }

    /// Discard all writes
    pub fn rollback(self) -> EngineResult<()> {
        self.finish();
        Ok(())
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        if state.active {
            state.active = false;
            state.writes.clear();
            self.engine.release_snapshot(self.snapshot);
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.finish();
    }
}
