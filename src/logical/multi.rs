//! Many values per key, each pair stored as its own engine key
//!
//! ## Scan bounds
//! ```text
//! values of k   [first(k), last(k)]
//! keys < k      (-inf, first(k))
//! keys <= k     (-inf, last(k)]
//! keys > k      (last(k), +inf)
//! keys >= k     [first(k), +inf)
//! everything    [global_first, global_last]
//! ```

use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;

use super::{DistinctKeys, EdgeFn, Extract, LogicalDatabase, ValueIterator};
use crate::codec::{FkfvCodec, KeyCodec, VkvvCodec};
use crate::engine::{EngineIterator, Namespace, Transaction};
use crate::error::{HgError, Result};

/// Multivalued database over fixed 16-byte keys and values
pub type FixedMultiValuedDb = MultiValuedDb<FkfvCodec>;

/// Multivalued database over variable-size keys and values
pub type VarMultiValuedDb = MultiValuedDb<VkvvCodec>;

/// Multivalued logical database, set-like on the full `(key, value)` pair
pub struct MultiValuedDb<C: KeyCodec> {
    namespace: Arc<Namespace>,
    codec: C,
}

impl<C: KeyCodec + Default> MultiValuedDb<C> {
    pub fn new(namespace: Arc<Namespace>) -> Self {
        Self {
            namespace,
            codec: C::default(),
        }
    }
}

impl<C: KeyCodec> MultiValuedDb<C> {
    pub fn codec(&self) -> &C {
        &self.codec
    }

    fn scan(
        &self,
        tx: &Transaction,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
    ) -> Result<EngineIterator> {
        tx.iterator(&self.namespace, lower, upper)
            .map_err(HgError::engine_in(format!("iterate {}", self.name())))
    }

    fn values_of(&self, cursor: EngineIterator) -> ValueIterator<Bytes> {
        let codec = self.codec.clone();
        let extract: Extract<Bytes> = Arc::new(move |engine_key: &[u8], _: &[u8]| {
            codec.extract_value(engine_key).map(Bytes::copy_from_slice)
        });
        ValueIterator::new(cursor, self.name(), extract)
    }

    fn keys_of(&self, cursor: EngineIterator) -> ValueIterator<Bytes> {
        let codec = self.codec.clone();
        let extract: Extract<Bytes> = Arc::new(move |engine_key: &[u8], _: &[u8]| {
            codec.extract_key(engine_key).map(Bytes::copy_from_slice)
        });

        let (past_codec, before_codec) = (self.codec.clone(), self.codec.clone());
        let distinct = DistinctKeys {
            past: Arc::new(move |engine_key: &[u8]| {
                past_codec.last_key(past_codec.extract_key(engine_key)?)
            }),
            before: Arc::new(move |engine_key: &[u8]| {
                before_codec.first_key(before_codec.extract_key(engine_key)?)
            }),
        };
        let locate_codec = self.codec.clone();
        let locate: EdgeFn = Arc::new(move |key: &[u8]| locate_codec.first_key(key));

        ValueIterator::new(cursor, self.name(), extract)
            .distinct(distinct)
            .locate(locate)
    }

    /// Number of values stored under `key`
    pub fn count_values(&self, tx: &Transaction, key: &[u8]) -> Result<u64> {
        let mut count = 0;
        for value in self.iterate_values_for_key(tx, key)? {
            value?;
            count += 1;
        }
        Ok(count)
    }

    /// Number of distinct keys
    pub fn count_keys(&self, tx: &Transaction) -> Result<u64> {
        let mut count = 0;
        for key in self.iterate_keys(tx)? {
            key?;
            count += 1;
        }
        Ok(count)
    }
}

impl<C: KeyCodec> LogicalDatabase for MultiValuedDb<C> {
    fn kind(&self) -> &'static str {
        C::NAME
    }

    fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    fn put(&self, tx: &Transaction, key: &[u8], value: &[u8]) -> Result<()> {
        let engine_key = self.codec.encode(key, value)?;
        tx.put(&self.namespace, &engine_key, &[])
            .map_err(HgError::engine_in(format!("put into {}", self.name())))
    }

    fn get(&self, tx: &Transaction, key: &[u8]) -> Result<Option<Bytes>> {
        self.iterate_values_for_key(tx, key)?.next().transpose()
    }

    fn delete(&self, tx: &Transaction, key: &[u8]) -> Result<()> {
        let cursor = self.scan(
            tx,
            Bound::Included(self.codec.first_key(key)?),
            Bound::Included(self.codec.last_key(key)?),
        )?;
        let context = || format!("delete from {}", self.name());

        cursor.seek_to_first().map_err(HgError::engine_in(context()))?;
        while let Some(engine_key) = cursor.key() {
            tx.delete(&self.namespace, &engine_key)
                .map_err(HgError::engine_in(context()))?;
            cursor.next().map_err(HgError::engine_in(context()))?;
        }
        cursor.close();
        Ok(())
    }

    fn delete_value(&self, tx: &Transaction, key: &[u8], value: &[u8]) -> Result<()> {
        let engine_key = self.codec.encode(key, value)?;
        tx.delete(&self.namespace, &engine_key)
            .map_err(HgError::engine_in(format!("delete from {}", self.name())))
    }

    fn iterate_values_for_key(&self, tx: &Transaction, key: &[u8]) -> Result<ValueIterator<Bytes>> {
        let cursor = self.scan(
            tx,
            Bound::Included(self.codec.first_key(key)?),
            Bound::Included(self.codec.last_key(key)?),
        )?;
        let codec = self.codec.clone();
        let owner = key.to_vec();
        let locate: EdgeFn = Arc::new(move |value: &[u8]| codec.encode(&owner, value));
        Ok(self.values_of(cursor).locate(locate))
    }

    fn iterate_keys(&self, tx: &Transaction) -> Result<ValueIterator<Bytes>> {
        let cursor = self.scan(
            tx,
            Bound::Included(self.codec.global_first()),
            Bound::Included(self.codec.global_last()),
        )?;
        Ok(self.keys_of(cursor))
    }

    fn iterate_values(&self, tx: &Transaction) -> Result<ValueIterator<Bytes>> {
        let cursor = self.scan(
            tx,
            Bound::Included(self.codec.global_first()),
            Bound::Included(self.codec.global_last()),
        )?;
        Ok(self.values_of(cursor))
    }

    fn iterate_lt(&self, tx: &Transaction, key: &[u8]) -> Result<ValueIterator<Bytes>> {
        let cursor = self.scan(tx, Bound::Unbounded, Bound::Excluded(self.codec.first_key(key)?))?;
        Ok(self.values_of(cursor))
    }

    fn iterate_lte(&self, tx: &Transaction, key: &[u8]) -> Result<ValueIterator<Bytes>> {
        let cursor = self.scan(tx, Bound::Unbounded, Bound::Included(self.codec.last_key(key)?))?;
        Ok(self.values_of(cursor))
    }

    fn iterate_gt(&self, tx: &Transaction, key: &[u8]) -> Result<ValueIterator<Bytes>> {
        let cursor = self.scan(tx, Bound::Excluded(self.codec.last_key(key)?), Bound::Unbounded)?;
        Ok(self.values_of(cursor))
    }

    fn iterate_gte(&self, tx: &Transaction, key: &[u8]) -> Result<ValueIterator<Bytes>> {
        let cursor = self.scan(tx, Bound::Included(self.codec.first_key(key)?), Bound::Unbounded)?;
        Ok(self.values_of(cursor))
    }
}
