//! Logical databases
//!
//! A logical database gives one engine namespace a key/value shape:
//!
//! | Variant | Values per key | Engine layout |
//! |---|---|---|
//! | [`SingleValuedDb`] | one | key -> value |
//! | [`FixedMultiValuedDb`] | many, 16-byte key and value | `key ++ value` -> empty |
//! | [`VarMultiValuedDb`] | many, any size | `len ++ flag ++ key ++ value` -> empty |
//!
//! Every operation runs inside a caller-owned [`Transaction`]. Operations a
//! variant cannot express fail with [`HgError::Unsupported`] rather than
//! returning nothing.

mod iter;
mod multi;
mod single;

pub use iter::ValueIterator;
pub use multi::{FixedMultiValuedDb, MultiValuedDb, VarMultiValuedDb};
pub use single::SingleValuedDb;

pub(crate) use iter::{DistinctKeys, EdgeFn, Extract};

use std::sync::Arc;

use bytes::Bytes;

use crate::engine::{Namespace, Transaction};
use crate::error::{HgError, Result};

/// Common operation set of the logical database variants
pub trait LogicalDatabase: Send + Sync {
    /// Human readable variant name, used in errors
    fn kind(&self) -> &'static str;

    fn namespace(&self) -> &Arc<Namespace>;

    fn name(&self) -> &str {
        self.namespace().name()
    }

    /// Store a pair. Single-valued databases overwrite; multivalued ones add.
    fn put(&self, tx: &Transaction, key: &[u8], value: &[u8]) -> Result<()>;

    /// The value of `key`; for multivalued databases the smallest one
    fn get(&self, tx: &Transaction, key: &[u8]) -> Result<Option<Bytes>>;

    /// Remove `key` and all of its values
    fn delete(&self, tx: &Transaction, key: &[u8]) -> Result<()>;

    /// Remove one `(key, value)` pair
    fn delete_value(&self, _tx: &Transaction, _key: &[u8], _value: &[u8]) -> Result<()> {
        Err(self.unsupported("delete of a single value"))
    }

    /// Values of `key` in ascending order
    fn iterate_values_for_key(&self, tx: &Transaction, key: &[u8]) -> Result<ValueIterator<Bytes>>;

    /// Distinct keys in ascending order
    fn iterate_keys(&self, _tx: &Transaction) -> Result<ValueIterator<Bytes>> {
        Err(self.unsupported("key iteration"))
    }

    /// Every value, ordered by key then value
    fn iterate_values(&self, _tx: &Transaction) -> Result<ValueIterator<Bytes>> {
        Err(self.unsupported("value iteration"))
    }

    /// Values of all keys less than `key`
    fn iterate_lt(&self, _tx: &Transaction, _key: &[u8]) -> Result<ValueIterator<Bytes>> {
        Err(self.unsupported("less-than scan"))
    }

    /// Values of all keys less than or equal to `key`
    fn iterate_lte(&self, _tx: &Transaction, _key: &[u8]) -> Result<ValueIterator<Bytes>> {
        Err(self.unsupported("less-or-equal scan"))
    }

    /// Values of all keys greater than `key`
    fn iterate_gt(&self, _tx: &Transaction, _key: &[u8]) -> Result<ValueIterator<Bytes>> {
        Err(self.unsupported("greater-than scan"))
    }

    /// Values of all keys greater than or equal to `key`
    fn iterate_gte(&self, _tx: &Transaction, _key: &[u8]) -> Result<ValueIterator<Bytes>> {
        Err(self.unsupported("greater-or-equal scan"))
    }

    fn unsupported(&self, operation: &'static str) -> HgError {
        HgError::Unsupported {
            operation,
            database: self.kind(),
        }
    }
}
