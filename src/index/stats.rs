//! Index statistics
//!
//! Counts are exact full scans unless the caller accepts an estimate and
//! the engine can provide one for the range in question. [`Count::estimated`]
//! says which happened.

use std::ops::Bound;

use super::Index;
use crate::codec::KeyCodec;
use crate::engine::Transaction;
use crate::error::{HgError, Result};
use crate::logical::{LogicalDatabase, VarMultiValuedDb};

/// A count and whether it is an estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Count {
    pub value: u64,
    pub estimated: bool,
}

impl Count {
    fn exact(value: u64) -> Self {
        Self {
            value,
            estimated: false,
        }
    }

    fn estimate(value: u64) -> Self {
        Self {
            value,
            estimated: true,
        }
    }
}

/// Statistics over one index
pub struct IndexStats<K, V> {
    index: Index<K, V>,
}

impl<K: 'static, V: 'static> IndexStats<K, V> {
    pub(crate) fn new(index: Index<K, V>) -> Self {
        Self { index }
    }

    fn estimate_key(&self, db: &VarMultiValuedDb, key: &[u8]) -> Result<Count> {
        let (first, last) = (db.codec().first_key(key)?, db.codec().last_key(key)?);
        let estimate = self
            .index
            .raw()
            .engine()
            .approximate_range(
                db.namespace(),
                Bound::Included(first.as_slice()),
                Bound::Included(last.as_slice()),
            )
            .map_err(HgError::engine_in(format!("estimate {}", db.name())))?;
        Ok(Count::estimate(estimate.rows))
    }

    /// Number of `(key, value)` pairs
    pub fn entries(&self, tx: &Transaction, estimate_ok: bool) -> Result<Count> {
        let raw = self.index.raw();
        raw.check_open()?;
        if estimate_ok {
            let estimate = raw
                .engine()
                .approximate_range(raw.forward().namespace(), Bound::Unbounded, Bound::Unbounded)
                .map_err(HgError::engine_in(format!("estimate {}", raw.forward().name())))?;
            return Ok(Count::estimate(estimate.rows));
        }
        let mut count = 0;
        for value in raw.forward().iterate_values(tx)? {
            value?;
            count += 1;
        }
        Ok(Count::exact(count))
    }

    /// Number of distinct keys; always exact
    pub fn keys(&self, tx: &Transaction, _estimate_ok: bool) -> Result<Count> {
        self.index.count(tx).map(Count::exact)
    }

    /// Number of values across all keys; always exact
    pub fn values(&self, tx: &Transaction, _estimate_ok: bool) -> Result<Count> {
        self.entries(tx, false)
    }

    /// Number of values of `key`
    pub fn values_of_key(&self, tx: &Transaction, key: &K, estimate_ok: bool) -> Result<Count> {
        let raw = self.index.raw();
        raw.check_open()?;
        if estimate_ok {
            return self.estimate_key(raw.forward(), &self.index.key_bytes(key)?);
        }
        self.index.count_key(tx, key).map(Count::exact)
    }

    /// Number of keys holding `value`; `None` unless the index is
    /// bidirectional
    pub fn keys_with_value(&self, tx: &Transaction, value: &V, estimate_ok: bool) -> Result<Option<Count>> {
        let raw = self.index.raw();
        raw.check_open()?;
        let Some(inverse) = raw.inverse() else {
            return Ok(None);
        };
        let value = self.index.value_bytes(value)?;
        if estimate_ok {
            return self.estimate_key(inverse, &value).map(Some);
        }
        inverse.count_values(tx, &value).map(|count| Some(Count::exact(count)))
    }
}
