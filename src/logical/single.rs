//! One value per key, stored verbatim

use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;

use super::{Extract, LogicalDatabase, ValueIterator};
use crate::engine::{Namespace, Transaction};
use crate::error::{HgError, Result};

/// Single-valued logical database
pub struct SingleValuedDb {
    namespace: Arc<Namespace>,
}

impl SingleValuedDb {
    pub fn new(namespace: Arc<Namespace>) -> Self {
        Self { namespace }
    }

    /// Whether `key` has a value
    pub fn contains(&self, tx: &Transaction, key: &[u8]) -> Result<bool> {
        Ok(self.get(tx, key)?.is_some())
    }
}

impl LogicalDatabase for SingleValuedDb {
    fn kind(&self) -> &'static str {
        "single-valued database"
    }

    fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    fn put(&self, tx: &Transaction, key: &[u8], value: &[u8]) -> Result<()> {
        tx.put(&self.namespace, key, value)
            .map_err(HgError::engine_in(format!("put into {}", self.name())))
    }

    fn get(&self, tx: &Transaction, key: &[u8]) -> Result<Option<Bytes>> {
        tx.get(&self.namespace, key)
            .map_err(HgError::engine_in(format!("get from {}", self.name())))
    }

    fn delete(&self, tx: &Transaction, key: &[u8]) -> Result<()> {
        tx.delete(&self.namespace, key)
            .map_err(HgError::engine_in(format!("delete from {}", self.name())))
    }

    /// Zero or one value
    fn iterate_values_for_key(&self, tx: &Transaction, key: &[u8]) -> Result<ValueIterator<Bytes>> {
        let cursor = tx
            .iterator(
                &self.namespace,
                Bound::Included(key.to_vec()),
                Bound::Included(key.to_vec()),
            )
            .map_err(HgError::engine_in(format!("iterate {}", self.name())))?;
        let extract: Extract<Bytes> =
            Arc::new(|_: &[u8], value: &[u8]| -> Result<Bytes> { Ok(Bytes::copy_from_slice(value)) });
        Ok(ValueIterator::new(cursor, self.name(), extract))
    }
}
