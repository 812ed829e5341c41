//! Index manager
//!
//! Owns the mapping from index names to open indices and the namespaces
//! behind them.
//!
//! ## Namespace lifecycle
//! ```text
//! Unregistered ──register_namespace──► Preexisting ──get_index──► Bound
//!      │                                                           │
//!      └──────────────get_index(create = true)─────────────────────┤
//!                                                                  ▼
//!                                                   remove_index: Dropped
//! ```
//!
//! ## Naming
//! ```text
//! INDEX>>>{index}>>>{key comparator id | NULL}>>>{value comparator id | NULL}
//! INV_INDEX>>>{index}>>>{key comparator id | NULL}>>>{value comparator id | NULL}
//! ```
//! Both names carry the ids in forward order; the inverse namespace is
//! ordered with the two comparators swapped.
//!
//! ## Locking
//! Bound indices are found under a read lock. Claiming, creating and
//! removing take the registry mutex only for bookkeeping; namespace I/O
//! runs outside it while the index name is reserved, and other callers
//! for that name wait on a condition variable.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info};

use crate::comparator::{ByteComparator, ComparatorAdapter};
use crate::engine::{Engine, Namespace};
use crate::error::{HgError, Result};
use crate::index::{BidirectionalIndex, ByteConverter, Index, RawIndex};
use crate::logical::LogicalDatabase;

pub const INDEX_PREFIX: &str = "INDEX";
pub const INVERSE_INDEX_PREFIX: &str = "INV_INDEX";
pub const SEPARATOR: &str = ">>>";
/// Stands for "no comparator" (bytewise order) in a namespace name
pub const NO_COMPARATOR: &str = "NULL";

// =============================================================================
// Namespace names
// =============================================================================

/// Parsed identity of an index namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexNamespaceName {
    pub inverse: bool,
    pub index: String,
    pub key_comparator: Option<String>,
    pub value_comparator: Option<String>,
}

/// A component must not contain the separator, nor start or end with `>`:
/// either would shift the split points when the name is parsed back.
fn check_component(what: &str, component: &str) -> Result<()> {
    if component.contains(SEPARATOR) {
        return Err(HgError::InvalidNamespaceName(format!(
            "{} {:?} contains {:?}",
            what, component, SEPARATOR
        )));
    }
    if component.starts_with('>') || component.ends_with('>') {
        return Err(HgError::InvalidNamespaceName(format!(
            "{} {:?} starts or ends with '>'",
            what, component
        )));
    }
    Ok(())
}

impl IndexNamespaceName {
    /// Forward namespace of `index`
    pub fn forward(index: &str, key_comparator: Option<&str>, value_comparator: Option<&str>) -> Result<Self> {
        check_component("index name", index)?;
        for id in key_comparator.iter().chain(value_comparator.iter()) {
            check_component("comparator id", id)?;
            if *id == NO_COMPARATOR {
                return Err(HgError::InvalidNamespaceName(format!(
                    "comparator id {:?} is reserved",
                    NO_COMPARATOR
                )));
            }
        }
        Ok(Self {
            inverse: false,
            index: index.to_string(),
            key_comparator: key_comparator.map(str::to_string),
            value_comparator: value_comparator.map(str::to_string),
        })
    }

    /// The other direction of the same index
    pub fn counterpart(&self) -> Self {
        Self {
            inverse: !self.inverse,
            ..self.clone()
        }
    }

    /// Parse a namespace name.
    ///
    /// `Ok(None)` for names that do not belong to an index; an error for
    /// index names that do not have exactly four parts or would not format
    /// back to `name`.
    pub fn parse(name: &str) -> Result<Option<Self>> {
        let parts: Vec<&str> = name.split(SEPARATOR).collect();
        let inverse = match parts[0] {
            INDEX_PREFIX => false,
            INVERSE_INDEX_PREFIX => true,
            _ => return Ok(None),
        };
        let [_, index, key, value] = parts.as_slice() else {
            return Err(HgError::InvalidNamespaceName(name.to_string()));
        };
        check_component("index name", index)?;
        check_component("comparator id", key)?;
        check_component("comparator id", value)?;

        let id = |part: &str| (part != NO_COMPARATOR).then(|| part.to_string());
        Ok(Some(Self {
            inverse,
            index: index.to_string(),
            key_comparator: id(*key),
            value_comparator: id(*value),
        }))
    }

    /// Comparator ids in the order the namespace is sorted by
    pub fn ordering_ids(&self) -> (Option<&str>, Option<&str>) {
        let (key, value) = (self.key_comparator.as_deref(), self.value_comparator.as_deref());
        if self.inverse {
            (value, key)
        } else {
            (key, value)
        }
    }
}

impl fmt::Display for IndexNamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.inverse {
            INVERSE_INDEX_PREFIX
        } else {
            INDEX_PREFIX
        };
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            prefix,
            self.index,
            self.key_comparator.as_deref().unwrap_or(NO_COMPARATOR),
            self.value_comparator.as_deref().unwrap_or(NO_COMPARATOR),
            sep = SEPARATOR
        )
    }
}

// =============================================================================
// Manager
// =============================================================================

/// A namespace found at startup that no index has claimed yet
struct Preexisting {
    identity: IndexNamespaceName,
    namespace: Arc<Namespace>,
    adapter: Arc<ComparatorAdapter>,
}

#[derive(Default)]
struct Registry {
    /// Keyed by namespace name
    preexisting: HashMap<String, Preexisting>,
    /// Index names with create/remove I/O in flight
    busy: HashSet<String>,
}

/// Creates, opens and removes indices by name
pub struct IndexManager {
    engine: Engine,
    bound: RwLock<HashMap<String, Arc<RawIndex>>>,
    registry: Mutex<Registry>,
    settled: Condvar,
    closed: AtomicBool,
}

fn comparator_id(comparator: &Option<Arc<dyn ByteComparator>>) -> Option<&str> {
    comparator.as_ref().map(|c| c.id())
}

impl IndexManager {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            bound: RwLock::new(HashMap::new()),
            registry: Mutex::new(Registry::default()),
            settled: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HgError::Closed("index manager".to_string()));
        }
        Ok(())
    }

    /// Hand over an index namespace discovered when the engine opened
    pub fn register_namespace(&self, namespace: Arc<Namespace>, adapter: Arc<ComparatorAdapter>) -> Result<()> {
        self.check_open()?;
        let identity = IndexNamespaceName::parse(namespace.name())?
            .ok_or_else(|| HgError::InvalidNamespaceName(namespace.name().to_string()))?;

        debug!(namespace = %namespace.name(), ready = adapter.is_configured(), "index namespace registered");
        self.registry.lock().preexisting.insert(
            namespace.name().to_string(),
            Preexisting {
                identity,
                namespace,
                adapter,
            },
        );
        Ok(())
    }

    /// Open (or with `create`, create) the index `name`.
    ///
    /// Returns `None` when the index does not exist and `create` is false.
    pub fn get_index<K: 'static, V: 'static>(
        &self,
        name: &str,
        keys: Arc<dyn ByteConverter<K>>,
        values: Arc<dyn ByteConverter<V>>,
        key_comparator: Option<Arc<dyn ByteComparator>>,
        value_comparator: Option<Arc<dyn ByteComparator>>,
        create: bool,
    ) -> Result<Option<Index<K, V>>> {
        let raw = self.obtain(name, key_comparator, value_comparator, false, create)?;
        Ok(raw.map(|raw| Index::new(raw, keys, values)))
    }

    /// Like [`IndexManager::get_index`], with value -> key lookups
    pub fn get_bidirectional_index<K: 'static, V: 'static>(
        &self,
        name: &str,
        keys: Arc<dyn ByteConverter<K>>,
        values: Arc<dyn ByteConverter<V>>,
        key_comparator: Option<Arc<dyn ByteComparator>>,
        value_comparator: Option<Arc<dyn ByteComparator>>,
        create: bool,
    ) -> Result<Option<BidirectionalIndex<K, V>>> {
        let raw = self.obtain(name, key_comparator, value_comparator, true, create)?;
        Ok(raw.map(|raw| BidirectionalIndex::new(Index::new(raw, keys, values))))
    }

    fn compatible(name: &str, raw: &Arc<RawIndex>, bidirectional: bool) -> Result<Arc<RawIndex>> {
        if bidirectional && !raw.is_bidirectional() {
            return Err(HgError::Precondition(format!("index {} is not bidirectional", name)));
        }
        // A bound index closed through a handle is handed out open again
        raw.open()?;
        Ok(Arc::clone(raw))
    }

    /// Wait until no create/remove of `name` is in flight
    fn wait_idle<'a>(&'a self, mut registry: MutexGuard<'a, Registry>, name: &str) -> MutexGuard<'a, Registry> {
        while registry.busy.contains(name) {
            self.settled.wait(&mut registry);
        }
        registry
    }

    fn release(&self, name: &str) {
        self.registry.lock().busy.remove(name);
        self.settled.notify_all();
    }

    fn obtain(
        &self,
        name: &str,
        key_comparator: Option<Arc<dyn ByteComparator>>,
        value_comparator: Option<Arc<dyn ByteComparator>>,
        bidirectional: bool,
        create: bool,
    ) -> Result<Option<Arc<RawIndex>>> {
        self.check_open()?;

        // Step 1: fast path
        if let Some(raw) = self.bound.read().get(name) {
            return Self::compatible(name, raw, bidirectional).map(Some);
        }

        let forward_name = IndexNamespaceName::forward(
            name,
            comparator_id(&key_comparator),
            comparator_id(&value_comparator),
        )?;
        let inverse_name = forward_name.counterpart();
        let (forward_key, inverse_key) = (forward_name.to_string(), inverse_name.to_string());

        // Step 2: double-check under the registry lock
        let mut registry = self.wait_idle(self.registry.lock(), name);
        self.check_open()?;
        if let Some(raw) = self.bound.read().get(name) {
            return Self::compatible(name, raw, bidirectional).map(Some);
        }

        // Step 3: claim namespaces found at startup
        if registry.preexisting.contains_key(&forward_key) {
            let has_inverse = registry.preexisting.contains_key(&inverse_key);
            if bidirectional && !has_inverse {
                error!(index = %name, namespace = %inverse_key, "bidirectional index is missing its inverse namespace");
                return Err(HgError::Inconsistency(format!(
                    "index {} has namespace {} but not {}",
                    name, forward_key, inverse_key
                )));
            }

            if let Some(forward) = registry.preexisting.get(&forward_key) {
                forward
                    .adapter
                    .configure(key_comparator.clone(), value_comparator.clone())?;
            }
            if let Some(inverse) = registry.preexisting.get(&inverse_key) {
                inverse
                    .adapter
                    .configure(value_comparator.clone(), key_comparator.clone())?;
            }

            let forward = registry.preexisting.remove(&forward_key);
            let inverse = registry.preexisting.remove(&inverse_key);
            let Some(forward) = forward else {
                return Err(HgError::Inconsistency(format!("namespace {} vanished while claiming", forward_key)));
            };

            let raw = Arc::new(RawIndex::new(
                name,
                self.engine.clone(),
                forward.namespace,
                inverse.map(|p| p.namespace),
            ));
            self.bound.write().insert(name.to_string(), Arc::clone(&raw));
            info!(index = %name, bidirectional = raw.is_bidirectional(), "index claimed");
            return Ok(Some(raw));
        }
        if registry.preexisting.contains_key(&inverse_key) {
            error!(index = %name, namespace = %inverse_key, "inverse namespace without a forward namespace");
            return Err(HgError::Inconsistency(format!(
                "index {} has namespace {} but not {}",
                name, inverse_key, forward_key
            )));
        }

        // Step 4: create
        if !create {
            return Ok(None);
        }
        registry.busy.insert(name.to_string());
        drop(registry);

        let created = self.create(name, &forward_key, &inverse_key, key_comparator, value_comparator, bidirectional);
        if let Ok(raw) = &created {
            self.bound.write().insert(name.to_string(), Arc::clone(raw));
        }
        self.release(name);
        created.map(Some)
    }

    fn create(
        &self,
        name: &str,
        forward_name: &str,
        inverse_name: &str,
        key_comparator: Option<Arc<dyn ByteComparator>>,
        value_comparator: Option<Arc<dyn ByteComparator>>,
        bidirectional: bool,
    ) -> Result<Arc<RawIndex>> {
        let adapter = ComparatorAdapter::with_comparators(forward_name, key_comparator.clone(), value_comparator.clone());
        let forward = self
            .engine
            .create_namespace(forward_name, Arc::new(adapter))
            .map_err(HgError::engine_in(format!("create index {}", name)))?;

        let inverse = if bidirectional {
            let adapter = ComparatorAdapter::with_comparators(inverse_name, value_comparator, key_comparator);
            match self.engine.create_namespace(inverse_name, Arc::new(adapter)) {
                Ok(namespace) => Some(namespace),
                Err(e) => {
                    if let Err(cleanup) = self.engine.drop_namespace(&forward) {
                        error!(index = %name, error = %cleanup, "failed to drop half-created index");
                    }
                    return Err(HgError::engine(format!("create index {}", name), e));
                }
            }
        } else {
            None
        };

        info!(index = %name, bidirectional, "index created");
        Ok(Arc::new(RawIndex::new(name, self.engine.clone(), forward, inverse)))
    }

    fn drop_checked(&self, index: &str, namespace: &Arc<Namespace>) -> Result<()> {
        match self.engine.namespace(namespace.name()) {
            Some(live) if Arc::ptr_eq(&live, namespace) => {}
            _ => {
                error!(index = %index, namespace = %namespace.name(), "namespace of a bound index is gone");
                return Err(HgError::Inconsistency(format!(
                    "namespace {} of index {} is not open",
                    namespace.name(),
                    index
                )));
            }
        }
        self.engine
            .drop_namespace(namespace)
            .map_err(HgError::engine_in(format!("remove index {}", index)))
    }

    fn drop_index_namespaces(&self, name: &str, raw: Option<&Arc<RawIndex>>, stale: &[Preexisting]) -> Result<()> {
        if let Some(raw) = raw {
            raw.retire();
            self.drop_checked(name, raw.forward().namespace())?;
            if let Some(inverse) = raw.inverse() {
                self.drop_checked(name, inverse.namespace())?;
            }
        }
        for unclaimed in stale {
            self.engine
                .drop_namespace(&unclaimed.namespace)
                .map_err(HgError::engine_in(format!("remove index {}", name)))?;
        }
        Ok(())
    }

    /// Close and drop the index `name` with all of its namespaces,
    /// including ones found at startup and never opened
    pub fn remove_index(&self, name: &str) -> Result<()> {
        self.check_open()?;
        check_component("index name", name)?;

        let mut registry = self.wait_idle(self.registry.lock(), name);
        let raw = self.bound.write().remove(name);
        let stale: Vec<String> = registry
            .preexisting
            .iter()
            .filter(|(_, p)| p.identity.index == name)
            .map(|(key, _)| key.clone())
            .collect();
        let stale: Vec<Preexisting> = stale
            .iter()
            .filter_map(|key| registry.preexisting.remove(key))
            .collect();
        if raw.is_none() && stale.is_empty() {
            debug!(index = %name, "no such index to remove");
            return Ok(());
        }
        registry.busy.insert(name.to_string());
        drop(registry);

        let result = self.drop_index_namespaces(name, raw.as_ref(), &stale);
        self.release(name);
        if result.is_ok() {
            info!(index = %name, "index removed");
        }
        result
    }

    /// Names of the indices currently open
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bound.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every open index and release unclaimed namespaces
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut registry = self.registry.lock();
        let bound: Vec<Arc<RawIndex>> = self.bound.write().drain().map(|(_, raw)| raw).collect();
        for raw in &bound {
            raw.retire();
        }
        let released = registry.preexisting.len();
        registry.preexisting.clear();
        info!(closed = bound.len(), released, "index manager closed");
    }
}

impl fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexManager")
            .field("bound", &self.index_names())
            .field("closed", &self.is_closed())
            .finish()
    }
}
