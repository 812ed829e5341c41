//! Indices searchable from both ends

use std::fmt;
use std::ops::Deref;

use super::{Index, ResultSet};
use crate::engine::Transaction;
use crate::error::Result;
use crate::logical::LogicalDatabase;

/// An [`Index`] that also answers "which keys have this value".
///
/// Every add/remove touches both namespaces inside the caller's
/// transaction, so the two sides commit or roll back together.
pub struct BidirectionalIndex<K, V> {
    index: Index<K, V>,
}

impl<K, V> Clone for BidirectionalIndex<K, V> {
    fn clone(&self) -> Self {
        Self {
            index: self.index.clone(),
        }
    }
}

impl<K: 'static, V: 'static> BidirectionalIndex<K, V> {
    pub(crate) fn new(index: Index<K, V>) -> Self {
        Self { index }
    }

    /// Keys holding `value`, ascending
    pub fn find_by_value(&self, tx: &Transaction, value: &V) -> Result<ResultSet<K>> {
        let raw = self.index.raw();
        raw.check_open()?;
        let items = raw
            .require_inverse()?
            .iterate_values_for_key(tx, &self.index.value_bytes(value)?)?;
        Ok(self.index.key_results(items))
    }

    /// Smallest key holding `value`
    pub fn find_first_by_value(&self, tx: &Transaction, value: &V) -> Result<Option<K>> {
        self.find_by_value(tx, value)?.next().transpose()
    }

    /// Number of keys holding `value`
    pub fn count_keys(&self, tx: &Transaction, value: &V) -> Result<u64> {
        let raw = self.index.raw();
        raw.check_open()?;
        raw.require_inverse()?
            .count_values(tx, &self.index.value_bytes(value)?)
    }
}

impl<K, V> Deref for BidirectionalIndex<K, V> {
    type Target = Index<K, V>;

    fn deref(&self) -> &Index<K, V> {
        &self.index
    }
}

impl<K, V> fmt::Debug for BidirectionalIndex<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BidirectionalIndex").field(&self.index).finish()
    }
}
