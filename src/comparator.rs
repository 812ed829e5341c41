//! Comparators for index namespaces
//!
//! ## Two-phase binding
//! An index namespace must have its comparator when the engine opens it,
//! but the logical key/value comparators are only known once someone asks
//! for the index by name. [`ComparatorAdapter`] bridges the gap: it is
//! created with the namespace name, handed to the engine, and configured
//! with the real comparators later. Until then the engine refuses to touch
//! the namespace.
//!
//! ## Identity
//! A comparator is identified by [`ByteComparator::id`]. The ids are
//! written into the namespace name, and on reopen a [`ComparatorRegistry`]
//! turns them back into comparators.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::codec::{parse, EdgeFlag};
use crate::engine::KeyComparator;
use crate::error::{HgError, Result};

/// Ordering over logical keys or values
pub trait ByteComparator: Send + Sync {
    /// Stable identifier, persisted in namespace names. Must not contain `>>>`.
    fn id(&self) -> &str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Comparators that can be looked up by id when reopening a store
#[derive(Clone, Default)]
pub struct ComparatorRegistry {
    comparators: HashMap<String, Arc<dyn ByteComparator>>,
}

impl ComparatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a comparator under its id, replacing any previous one
    pub fn register(&mut self, comparator: Arc<dyn ByteComparator>) -> &mut Self {
        self.comparators.insert(comparator.id().to_string(), comparator);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ByteComparator>> {
        self.comparators.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.comparators.contains_key(id)
    }
}

impl fmt::Debug for ComparatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.comparators.keys()).finish()
    }
}

fn compare_with(comparator: &Option<Arc<dyn ByteComparator>>, a: &[u8], b: &[u8]) -> Ordering {
    match comparator {
        Some(comparator) => comparator.compare(a, b),
        None => a.cmp(b),
    }
}

fn same(a: &Option<Arc<dyn ByteComparator>>, b: &Option<Arc<dyn ByteComparator>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.id() == b.id(),
        _ => false,
    }
}

struct Configured {
    key: Option<Arc<dyn ByteComparator>>,
    value: Option<Arc<dyn ByteComparator>>,
}

/// Engine comparator for variable-key variable-value index namespaces.
///
/// Orders engine keys by:
/// 1. global edges before/after everything
/// 2. logical key, by the key comparator
/// 3. range edges before/after every value of their key
/// 4. logical value, by the value comparator
///
/// An absent comparator means unsigned bytewise order.
pub struct ComparatorAdapter {
    name: String,
    configured: OnceLock<Configured>,
}

impl ComparatorAdapter {
    /// An adapter that is not usable until [`ComparatorAdapter::configure`]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configured: OnceLock::new(),
        }
    }

    /// An adapter configured up front
    pub fn with_comparators(
        name: impl Into<String>,
        key: Option<Arc<dyn ByteComparator>>,
        value: Option<Arc<dyn ByteComparator>>,
    ) -> Self {
        let adapter = Self::new(name);
        let _ = adapter.configured.set(Configured { key, value });
        adapter
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install the logical comparators.
    ///
    /// Configuring again with comparators of the same ids is a no-op;
    /// different ids are rejected since records are already ordered.
    pub fn configure(
        &self,
        key: Option<Arc<dyn ByteComparator>>,
        value: Option<Arc<dyn ByteComparator>>,
    ) -> Result<()> {
        let current = self.configured.get_or_init(|| Configured {
            key: key.clone(),
            value: value.clone(),
        });
        if same(&current.key, &key) && same(&current.value, &value) {
            Ok(())
        } else {
            Err(HgError::Precondition(format!(
                "comparators of {} are already configured differently",
                self.name
            )))
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured.get().is_some()
    }

    /// Compare two engine keys.
    ///
    /// # Panics
    /// If the adapter has not been configured. The engine checks
    /// [`KeyComparator::is_ready`] before ordering anything, so this only
    /// fires on direct use.
    pub fn compare_engine_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        let Some(configured) = self.configured.get() else {
            panic!("comparator adapter {} used before it was configured", self.name);
        };

        let (a, b) = (parse(a), parse(b));
        match (a.flag, b.flag) {
            (EdgeFlag::GlobalStart, EdgeFlag::GlobalStart) | (EdgeFlag::GlobalEnd, EdgeFlag::GlobalEnd) => {
                return Ordering::Equal
            }
            (EdgeFlag::GlobalStart, _) | (_, EdgeFlag::GlobalEnd) => return Ordering::Less,
            (EdgeFlag::GlobalEnd, _) | (_, EdgeFlag::GlobalStart) => return Ordering::Greater,
            _ => {}
        }

        let by_key = compare_with(&configured.key, a.key, b.key);
        if by_key != Ordering::Equal {
            return by_key;
        }

        match (a.flag, b.flag) {
            (EdgeFlag::RangeStart, EdgeFlag::RangeStart) | (EdgeFlag::RangeEnd, EdgeFlag::RangeEnd) => Ordering::Equal,
            (EdgeFlag::RangeStart, _) | (_, EdgeFlag::RangeEnd) => Ordering::Less,
            (EdgeFlag::RangeEnd, _) | (_, EdgeFlag::RangeStart) => Ordering::Greater,
            _ => compare_with(&configured.value, a.value, b.value),
        }
    }
}

impl KeyComparator for ComparatorAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.compare_engine_keys(a, b)
    }

    fn is_ready(&self) -> bool {
        self.is_configured()
    }
}

impl fmt::Debug for ComparatorAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComparatorAdapter")
            .field("name", &self.name)
            .field("configured", &self.is_configured())
            .finish()
    }
}
