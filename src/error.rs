//! Error types for hgindex
//!
//! Two layers of errors:
//! - [`EngineError`]: failures of the embedded ordered key-value engine
//! - [`HgError`]: what index consumers see; engine failures arrive wrapped
//!   with the namespace and operation that hit them
//!
//! ## Taxonomy
//! Every [`HgError`] falls in one of the [`ErrorKind`] buckets so callers can
//! tell "you used it wrong" from "storage is broken" without matching on
//! individual variants.

use thiserror::Error;

/// Result type alias using HgError
pub type Result<T> = std::result::Result<T, HgError>;

/// Result type alias for engine-level operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failures of the embedded engine
#[derive(Debug, Error)]
pub enum EngineError {
    // -------------------------------------------------------------------------
    // I/O and Durability
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAL corruption detected: {0}")]
    Corruption(String),

    #[error("Partial write detected: {0}")]
    PartialWrite(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // -------------------------------------------------------------------------
    // Namespace Errors
    // -------------------------------------------------------------------------
    #[error("Namespace {0} already exists")]
    NamespaceExists(String),

    #[error("Namespace {0} not found")]
    NamespaceNotFound(String),

    #[error("Namespace {0} has been dropped")]
    NamespaceDropped(String),

    #[error("Namespace {0} exists on disk but no descriptor was supplied at open")]
    MissingDescriptor(String),

    #[error("Comparator {0} is not configured")]
    ComparatorNotReady(String),

    // -------------------------------------------------------------------------
    // Transaction Errors
    // -------------------------------------------------------------------------
    #[error("Write conflict on namespace {namespace}: key modified after snapshot {snapshot}")]
    Conflict { namespace: String, snapshot: u64 },

    #[error("Transaction is no longer active")]
    TransactionClosed,

    #[error("Iterator has been closed")]
    IteratorClosed,

    #[error("Engine has been closed")]
    EngineClosed,
}

/// Coarse classification of an [`HgError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad argument: wrong fixed size, malformed name, undecodable bytes
    Precondition,
    /// Storage failed underneath us
    Engine,
    /// Operation on a closed index, iterator, manager or store
    Closed,
    /// The manager's own bookkeeping is wrong
    Inconsistency,
    /// The operation is not defined for this logical database variant
    Unsupported,
}

/// Unified error type for index-layer operations
#[derive(Debug, Error)]
pub enum HgError {
    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Illegal index namespace name: {0}")]
    InvalidNamespaceName(String),

    #[error("{operation} is not supported by {database}")]
    Unsupported {
        operation: &'static str,
        database: &'static str,
    },

    #[error("{0} is closed")]
    Closed(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("{context}: {source}")]
    Engine {
        context: String,
        #[source]
        source: EngineError,
    },

    #[error("Comparators for namespace {namespace} cannot be reconstructed")]
    ComparatorUnavailable { namespace: String },

    #[error("Stored data is corrupt: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Manager Errors
    // -------------------------------------------------------------------------
    #[error("Index manager inconsistency: {0}")]
    Inconsistency(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HgError {
    /// Wrap an engine failure with what was being done when it happened.
    ///
    /// A namespace whose comparator never got configured surfaces as
    /// [`HgError::ComparatorUnavailable`] rather than a generic engine error.
    pub fn engine(context: impl Into<String>, source: EngineError) -> Self {
        match source {
            EngineError::ComparatorNotReady(namespace) => HgError::ComparatorUnavailable { namespace },
            source => HgError::Engine {
                context: context.into(),
                source,
            },
        }
    }

    /// Closure form of [`HgError::engine`] for `map_err`
    pub fn engine_in(context: impl Into<String>) -> impl FnOnce(EngineError) -> HgError {
        let context = context.into();
        move |source| HgError::engine(context, source)
    }

    /// The taxonomy bucket this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            HgError::Precondition(_)
            | HgError::Conversion(_)
            | HgError::InvalidNamespaceName(_)
            | HgError::Config(_) => ErrorKind::Precondition,
            HgError::Unsupported { .. } => ErrorKind::Unsupported,
            HgError::Closed(_) => ErrorKind::Closed,
            HgError::Engine { .. } | HgError::ComparatorUnavailable { .. } | HgError::Corruption(_) => {
                ErrorKind::Engine
            }
            HgError::Inconsistency(_) => ErrorKind::Inconsistency,
        }
    }

    /// Whether the transaction owner may retry after this error.
    ///
    /// Only optimistic commit conflicts qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HgError::Engine {
                source: EngineError::Conflict { .. },
                ..
            }
        )
    }
}
