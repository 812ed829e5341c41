//! Store: the storage layer a hypergraph database sits on
//!
//! Opens the engine and gives its namespaces their roles:
//!
//! | Namespace | Database | Holds |
//! |---|---|---|
//! | `PRIMITIVE` | single-valued | raw data of an atom |
//! | `DATA` | single-valued | the target handles of a link |
//! | `INCIDENCE` | fixed multivalued | atom -> links pointing at it |
//! | `INDEX>>>..`, `INV_INDEX>>>..` | variable multivalued | user indices |
//!
//! Any other namespace found on disk is an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::HANDLE_SIZE;
use crate::comparator::{ByteComparator, ComparatorAdapter, ComparatorRegistry};
use crate::config::Config;
use crate::engine::{BytewiseComparator, Engine, KeyComparator, Namespace, NamespaceDescriptor, Transaction};
use crate::error::{HgError, Result};
use crate::index::{BidirectionalIndex, ByteConverter, Index, ResultSet};
use crate::logical::{FixedMultiValuedDb, LogicalDatabase, SingleValuedDb};
use crate::manager::{IndexManager, IndexNamespaceName};

pub const PRIMITIVE_NAMESPACE: &str = "PRIMITIVE";
pub const DATA_NAMESPACE: &str = "DATA";
pub const INCIDENCE_NAMESPACE: &str = "INCIDENCE";

/// Persistent identity of an atom
pub type Handle = [u8; HANDLE_SIZE];

/// Resolve a comparator id from a namespace name; `NULL` means none
fn resolve(registry: &ComparatorRegistry, id: Option<&str>) -> Option<Option<Arc<dyn ByteComparator>>> {
    match id {
        None => Some(None),
        Some(id) => registry.get(id).map(Some),
    }
}

/// Engine descriptor for one namespace found on disk, plus the adapter
/// to hand to the index manager for index namespaces
fn describe(
    name: &str,
    registry: &ComparatorRegistry,
) -> Result<(NamespaceDescriptor, Option<Arc<ComparatorAdapter>>)> {
    if matches!(name, PRIMITIVE_NAMESPACE | DATA_NAMESPACE | INCIDENCE_NAMESPACE) {
        return Ok((NamespaceDescriptor::new(name, Arc::new(BytewiseComparator)), None));
    }

    let identity = IndexNamespaceName::parse(name)?
        .ok_or_else(|| HgError::InvalidNamespaceName(format!("unknown namespace {}", name)))?;
    let adapter = Arc::new(ComparatorAdapter::new(name));

    let (first, second) = identity.ordering_ids();
    match (resolve(registry, first), resolve(registry, second)) {
        (Some(first), Some(second)) => adapter.configure(first, second)?,
        _ => debug!(namespace = %name, "comparators not registered, waiting for the index to be opened"),
    }

    let comparator: Arc<dyn KeyComparator> = adapter.clone();
    Ok((NamespaceDescriptor::new(name, comparator), Some(adapter)))
}

fn check_handle(what: &str, bytes: &[u8]) -> Result<Handle> {
    bytes.try_into().map_err(|_| {
        HgError::Corruption(format!("{} of {} bytes is not a handle", what, bytes.len()))
    })
}

/// The storage layer: primary databases, incidence sets and indices over
/// one engine
pub struct Store {
    config: Config,
    engine: Engine,
    primitive: SingleValuedDb,
    data: SingleValuedDb,
    incidence: FixedMultiValuedDb,
    indices: IndexManager,
    closed: AtomicBool,
}

impl Store {
    /// Open the store at `config.data_dir`.
    ///
    /// Index namespaces whose comparator ids are all in `registry` are
    /// usable right away; the rest become usable when their index is
    /// requested with the matching comparators.
    pub fn open(config: Config, registry: &ComparatorRegistry) -> Result<Self> {
        config.validate()?;

        // Step 1: discover namespaces and describe them
        let names = Engine::list_namespaces(&config.data_dir)
            .map_err(HgError::engine_in("list namespaces"))?;
        let mut descriptors = Vec::with_capacity(names.len());
        let mut adapters = Vec::new();
        for name in &names {
            let (descriptor, adapter) = describe(name, registry)?;
            descriptors.push(descriptor);
            if let Some(adapter) = adapter {
                adapters.push((name.clone(), adapter));
            }
        }

        // Step 2: open the engine
        let engine = Engine::open(&config, descriptors).map_err(HgError::engine_in("open engine"))?;

        // Step 3: primary namespaces
        let primary = |name: &str| -> Result<Arc<Namespace>> {
            match engine.namespace(name) {
                Some(namespace) => Ok(namespace),
                None => engine
                    .create_namespace(name, Arc::new(BytewiseComparator))
                    .map_err(HgError::engine_in(format!("create {}", name))),
            }
        };
        let primitive = SingleValuedDb::new(primary(PRIMITIVE_NAMESPACE)?);
        let data = SingleValuedDb::new(primary(DATA_NAMESPACE)?);
        let incidence = FixedMultiValuedDb::new(primary(INCIDENCE_NAMESPACE)?);

        // Step 4: hand index namespaces to the manager
        let indices = IndexManager::new(engine.clone());
        for (name, adapter) in adapters {
            let namespace = engine.namespace(&name).ok_or_else(|| {
                HgError::Inconsistency(format!("namespace {} disappeared during open", name))
            })?;
            indices.register_namespace(namespace, adapter)?;
        }

        info!(
            data_dir = %config.data_dir.display(),
            namespaces = names.len(),
            "store opened"
        );

        Ok(Self {
            config,
            engine,
            primitive,
            data,
            incidence,
            indices,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HgError::Closed("store".to_string()));
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn index_manager(&self) -> &IndexManager {
        &self.indices
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub fn begin(&self) -> Result<Transaction> {
        self.check_open()?;
        self.engine.begin().map_err(HgError::engine_in("begin transaction"))
    }

    /// Run `work` in a new transaction, committing on success and rolling
    /// back on error. Conflicts are returned, not retried.
    pub fn ensure_transaction<R>(&self, work: impl FnOnce(&Transaction) -> Result<R>) -> Result<R> {
        let tx = self.begin()?;
        match work(&tx) {
            Ok(result) => {
                tx.commit().map_err(HgError::engine_in("commit transaction"))?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // Primitive data
    // =========================================================================

    pub fn store_data(&self, tx: &Transaction, handle: &Handle, data: &[u8]) -> Result<()> {
        self.check_open()?;
        self.primitive.put(tx, handle, data)
    }

    pub fn get_data(&self, tx: &Transaction, handle: &Handle) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.primitive.get(tx, handle)?.map(|data| data.to_vec()))
    }

    pub fn remove_data(&self, tx: &Transaction, handle: &Handle) -> Result<()> {
        self.check_open()?;
        self.primitive.delete(tx, handle)
    }

    pub fn contains_data(&self, tx: &Transaction, handle: &Handle) -> Result<bool> {
        self.check_open()?;
        self.primitive.contains(tx, handle)
    }

    // =========================================================================
    // Links
    // =========================================================================

    /// Store the target set of link `handle`
    pub fn store_link(&self, tx: &Transaction, handle: &Handle, targets: &[Handle]) -> Result<()> {
        self.check_open()?;
        let value = targets.concat();
        self.data.put(tx, handle, &value)
    }

    pub fn get_link(&self, tx: &Transaction, handle: &Handle) -> Result<Option<Vec<Handle>>> {
        self.check_open()?;
        let Some(value) = self.data.get(tx, handle)? else {
            return Ok(None);
        };
        if value.len() % HANDLE_SIZE != 0 {
            return Err(HgError::Corruption(format!(
                "link value of {} bytes is not a whole number of handles",
                value.len()
            )));
        }
        value
            .chunks(HANDLE_SIZE)
            .map(|chunk| check_handle("link target", chunk))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    pub fn remove_link(&self, tx: &Transaction, handle: &Handle) -> Result<()> {
        self.check_open()?;
        self.data.delete(tx, handle)
    }

    pub fn contains_link(&self, tx: &Transaction, handle: &Handle) -> Result<bool> {
        self.check_open()?;
        self.data.contains(tx, handle)
    }

    // =========================================================================
    // Incidence sets
    // =========================================================================

    /// Record that `link` points at `atom`
    pub fn add_incidence_link(&self, tx: &Transaction, atom: &Handle, link: &Handle) -> Result<()> {
        self.check_open()?;
        self.incidence.put(tx, atom, link)
    }

    pub fn remove_incidence_link(&self, tx: &Transaction, atom: &Handle, link: &Handle) -> Result<()> {
        self.check_open()?;
        self.incidence.delete_value(tx, atom, link)
    }

    pub fn remove_incidence_set(&self, tx: &Transaction, atom: &Handle) -> Result<()> {
        self.check_open()?;
        self.incidence.delete(tx, atom)
    }

    /// Links pointing at `atom`, in handle order
    pub fn incidence_set(&self, tx: &Transaction, atom: &Handle) -> Result<ResultSet<Handle>> {
        self.check_open()?;
        let items = self
            .incidence
            .iterate_values_for_key(tx, atom)?
            .map_with(|bytes| check_handle("incidence link", &bytes));
        let to_bytes = Arc::new(|handle: &Handle| -> Result<Vec<u8>> { Ok(handle.to_vec()) });
        Ok(ResultSet::new(items, to_bytes))
    }

    pub fn incidence_set_cardinality(&self, tx: &Transaction, atom: &Handle) -> Result<u64> {
        self.check_open()?;
        self.incidence.count_values(tx, atom)
    }

    // =========================================================================
    // Indices
    // =========================================================================

    pub fn get_index<K: 'static, V: 'static>(
        &self,
        name: &str,
        keys: Arc<dyn ByteConverter<K>>,
        values: Arc<dyn ByteConverter<V>>,
        key_comparator: Option<Arc<dyn ByteComparator>>,
        value_comparator: Option<Arc<dyn ByteComparator>>,
        create: bool,
    ) -> Result<Option<Index<K, V>>> {
        self.check_open()?;
        self.indices
            .get_index(name, keys, values, key_comparator, value_comparator, create)
    }

    pub fn get_bidirectional_index<K: 'static, V: 'static>(
        &self,
        name: &str,
        keys: Arc<dyn ByteConverter<K>>,
        values: Arc<dyn ByteConverter<V>>,
        key_comparator: Option<Arc<dyn ByteComparator>>,
        value_comparator: Option<Arc<dyn ByteComparator>>,
        create: bool,
    ) -> Result<Option<BidirectionalIndex<K, V>>> {
        self.check_open()?;
        self.indices
            .get_bidirectional_index(name, keys, values, key_comparator, value_comparator, create)
    }

    pub fn remove_index(&self, name: &str) -> Result<()> {
        self.check_open()?;
        self.indices.remove_index(name)
    }

    /// Rewrite the WAL to hold only live records
    pub fn compact(&self) -> Result<()> {
        self.check_open()?;
        self.engine.compact().map_err(HgError::engine_in("compact"))
    }

    /// Close all indices and the engine. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.indices.close();
        self.engine.close().map_err(HgError::engine_in("close engine"))?;
        info!(data_dir = %self.config.data_dir.display(), "store closed");
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close store on drop");
        }
    }
}
