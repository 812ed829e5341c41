//! Indices
//!
//! An [`Index`] is a named, typed, multivalued key -> value mapping stored
//! in one variable-key variable-value namespace. A [`BidirectionalIndex`]
//! keeps a second namespace holding every pair reversed, so lookups work
//! from values to keys as well.
//!
//! ```text
//!   Index<K, V> ──converters──► RawIndex ──► forward: INDEX>>>name>>>..
//!                                       └──► inverse: INV_INDEX>>>name>>>..
//! ```
//!
//! Index handles are cheap to clone and share one open/closed state with
//! every other handle to the same index. Every operation runs in a
//! caller-owned [`Transaction`] and fails with [`HgError::Closed`] once the
//! index is closed.

mod bidirectional;
mod convert;
mod result;
mod stats;

pub use bidirectional::BidirectionalIndex;
pub use convert::{ByteConverter, BytesConverter, I32Converter, I64Converter, StringConverter};
pub use result::{GotoResult, ResultSet};
pub use stats::{Count, IndexStats};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::engine::{Engine, Namespace, Transaction};
use crate::error::{HgError, Result};
use crate::logical::{LogicalDatabase, ValueIterator, VarMultiValuedDb};

use result::ToBytes;

// =============================================================================
// Untyped index
// =============================================================================

/// Byte-level index shared by all typed handles
pub(crate) struct RawIndex {
    name: String,
    engine: Engine,
    forward: VarMultiValuedDb,
    inverse: Option<VarMultiValuedDb>,
    open: AtomicBool,
    /// Set once the index is removed or its manager closed; never cleared
    retired: AtomicBool,
}

impl RawIndex {
    pub(crate) fn new(
        name: impl Into<String>,
        engine: Engine,
        forward: Arc<Namespace>,
        inverse: Option<Arc<Namespace>>,
    ) -> Self {
        Self {
            name: name.into(),
            engine,
            forward: VarMultiValuedDb::new(forward),
            inverse: inverse.map(VarMultiValuedDb::new),
            open: AtomicBool::new(true),
            retired: AtomicBool::new(false),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn forward(&self) -> &VarMultiValuedDb {
        &self.forward
    }

    pub(crate) fn inverse(&self) -> Option<&VarMultiValuedDb> {
        self.inverse.as_ref()
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn is_bidirectional(&self) -> bool {
        self.inverse.is_some()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!(index = %self.name, "index closed");
        }
    }

    /// Reopen after [`RawIndex::close`]. Retired indices stay closed.
    pub(crate) fn open(&self) -> Result<()> {
        if self.retired.load(Ordering::Acquire) {
            return Err(HgError::Closed(format!("index {} (removed or manager closed)", self.name)));
        }
        if !self.open.swap(true, Ordering::AcqRel) {
            debug!(index = %self.name, "index reopened");
        }
        Ok(())
    }

    /// Close for good: the manager no longer hands this index out
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        self.close();
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if !self.is_open() {
            return Err(HgError::Closed(format!("index {}", self.name)));
        }
        Ok(())
    }

    /// Inverse side, which a bidirectional handle requires
    pub(crate) fn require_inverse(&self) -> Result<&VarMultiValuedDb> {
        self.inverse.as_ref().ok_or_else(|| {
            HgError::Inconsistency(format!("index {} has no inverse namespace", self.name))
        })
    }

    pub(crate) fn add_entry(&self, tx: &Transaction, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        self.forward.put(tx, key, value)?;
        if let Some(inverse) = &self.inverse {
            inverse.put(tx, value, key)?;
        }
        Ok(())
    }

    pub(crate) fn remove_entry(&self, tx: &Transaction, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        self.forward.delete_value(tx, key, value)?;
        if let Some(inverse) = &self.inverse {
            inverse.delete_value(tx, value, key)?;
        }
        Ok(())
    }

    pub(crate) fn remove_all_entries(&self, tx: &Transaction, key: &[u8]) -> Result<()> {
        self.check_open()?;
        if let Some(inverse) = &self.inverse {
            let values: Vec<Bytes> = self
                .forward
                .iterate_values_for_key(tx, key)?
                .collect::<Result<_>>()?;
            for value in values {
                inverse.delete_value(tx, &value, key)?;
            }
        }
        self.forward.delete(tx, key)
    }
}

impl fmt::Debug for RawIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawIndex")
            .field("name", &self.name)
            .field("forward", &self.forward.name())
            .field("inverse", &self.inverse.as_ref().map(|db| db.name().to_string()))
            .field("open", &self.is_open())
            .finish()
    }
}

// =============================================================================
// Typed index
// =============================================================================

/// Typed handle to a multivalued index
pub struct Index<K, V> {
    raw: Arc<RawIndex>,
    keys: Arc<dyn ByteConverter<K>>,
    values: Arc<dyn ByteConverter<V>>,
}

impl<K, V> Clone for Index<K, V> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
            keys: Arc::clone(&self.keys),
            values: Arc::clone(&self.values),
        }
    }
}

impl<K: 'static, V: 'static> Index<K, V> {
    pub(crate) fn new(
        raw: Arc<RawIndex>,
        keys: Arc<dyn ByteConverter<K>>,
        values: Arc<dyn ByteConverter<V>>,
    ) -> Self {
        Self { raw, keys, values }
    }

    pub(crate) fn raw(&self) -> &Arc<RawIndex> {
        &self.raw
    }

    pub fn name(&self) -> &str {
        self.raw.name()
    }

    pub fn is_open(&self) -> bool {
        self.raw.is_open()
    }

    pub fn is_bidirectional(&self) -> bool {
        self.raw.is_bidirectional()
    }

    /// Close this index for every handle. Data is kept.
    pub fn close(&self) {
        self.raw.close();
    }

    /// Reopen a closed index for every handle. Fails with
    /// [`HgError::Closed`] once the index was removed or its manager closed.
    pub fn open(&self) -> Result<()> {
        self.raw.open()
    }

    pub(crate) fn key_bytes(&self, key: &K) -> Result<Vec<u8>> {
        self.keys.to_bytes(key)
    }

    pub(crate) fn value_bytes(&self, value: &V) -> Result<Vec<u8>> {
        self.values.to_bytes(value)
    }

    pub(crate) fn key_results(&self, items: ValueIterator<Bytes>) -> ResultSet<K> {
        let (decode, encode) = (Arc::clone(&self.keys), Arc::clone(&self.keys));
        let to_bytes: ToBytes<K> = Arc::new(move |key: &K| encode.to_bytes(key));
        ResultSet::new(items.map_with(move |bytes| decode.from_bytes(&bytes)), to_bytes)
    }

    pub(crate) fn value_results(&self, items: ValueIterator<Bytes>) -> ResultSet<V> {
        let (decode, encode) = (Arc::clone(&self.values), Arc::clone(&self.values));
        let to_bytes: ToBytes<V> = Arc::new(move |value: &V| encode.to_bytes(value));
        ResultSet::new(items.map_with(move |bytes| decode.from_bytes(&bytes)), to_bytes)
    }

    /// Add `(key, value)`; adding an existing pair is a no-op
    pub fn add_entry(&self, tx: &Transaction, key: &K, value: &V) -> Result<()> {
        self.raw
            .add_entry(tx, &self.key_bytes(key)?, &self.value_bytes(value)?)
    }

    /// Remove one `(key, value)` pair
    pub fn remove_entry(&self, tx: &Transaction, key: &K, value: &V) -> Result<()> {
        self.raw
            .remove_entry(tx, &self.key_bytes(key)?, &self.value_bytes(value)?)
    }

    /// Remove `key` with all of its values
    pub fn remove_all_entries(&self, tx: &Transaction, key: &K) -> Result<()> {
        self.raw.remove_all_entries(tx, &self.key_bytes(key)?)
    }

    /// Values of `key`, ascending
    pub fn find(&self, tx: &Transaction, key: &K) -> Result<ResultSet<V>> {
        self.raw.check_open()?;
        let items = self
            .raw
            .forward()
            .iterate_values_for_key(tx, &self.key_bytes(key)?)?;
        Ok(self.value_results(items))
    }

    /// Smallest value of `key`
    pub fn find_first(&self, tx: &Transaction, key: &K) -> Result<Option<V>> {
        self.raw.check_open()?;
        match self.raw.forward().get(tx, &self.key_bytes(key)?)? {
            Some(bytes) => self.values.from_bytes(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Distinct keys, ascending
    pub fn scan_keys(&self, tx: &Transaction) -> Result<ResultSet<K>> {
        self.raw.check_open()?;
        Ok(self.key_results(self.raw.forward().iterate_keys(tx)?))
    }

    /// All values, ordered by key then value
    pub fn scan_values(&self, tx: &Transaction) -> Result<ResultSet<V>> {
        self.raw.check_open()?;
        Ok(self.value_results(self.raw.forward().iterate_values(tx)?))
    }

    /// Values of keys strictly less than `key`
    pub fn find_lt(&self, tx: &Transaction, key: &K) -> Result<ResultSet<V>> {
        self.raw.check_open()?;
        let items = self.raw.forward().iterate_lt(tx, &self.key_bytes(key)?)?;
        Ok(self.value_results(items))
    }

    /// Values of keys less than or equal to `key`
    pub fn find_lte(&self, tx: &Transaction, key: &K) -> Result<ResultSet<V>> {
        self.raw.check_open()?;
        let items = self.raw.forward().iterate_lte(tx, &self.key_bytes(key)?)?;
        Ok(self.value_results(items))
    }

    /// Values of keys strictly greater than `key`
    pub fn find_gt(&self, tx: &Transaction, key: &K) -> Result<ResultSet<V>> {
        self.raw.check_open()?;
        let items = self.raw.forward().iterate_gt(tx, &self.key_bytes(key)?)?;
        Ok(self.value_results(items))
    }

    /// Values of keys greater than or equal to `key`
    pub fn find_gte(&self, tx: &Transaction, key: &K) -> Result<ResultSet<V>> {
        self.raw.check_open()?;
        let items = self.raw.forward().iterate_gte(tx, &self.key_bytes(key)?)?;
        Ok(self.value_results(items))
    }

    /// Number of distinct keys, by full scan
    pub fn count(&self, tx: &Transaction) -> Result<u64> {
        self.raw.check_open()?;
        self.raw.forward().count_keys(tx)
    }

    /// Number of values of `key`
    pub fn count_key(&self, tx: &Transaction, key: &K) -> Result<u64> {
        self.raw.check_open()?;
        self.raw.forward().count_values(tx, &self.key_bytes(key)?)
    }

    pub fn stats(&self) -> Result<IndexStats<K, V>> {
        self.raw.check_open()?;
        Ok(IndexStats::new(self.clone()))
    }
}

impl<K, V> fmt::Debug for Index<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Index").field(&self.raw).finish()
    }
}
