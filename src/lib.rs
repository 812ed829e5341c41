//! # hgindex
//!
//! Logical indexing layer for a hypergraph database, over an embedded
//! ordered key/value engine:
//! - Single-valued and multivalued logical databases encoded into one
//!   ordered key space per namespace
//! - Named, typed, optionally bidirectional indices with range scans
//! - Index namespaces rediscovered and rebound across restarts
//! - Write-Ahead Logging (WAL) with crash recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │     primitive / data / incidence        IndexManager        │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │                               │
//!                ▼                               ▼
//!   ┌─────────────────────────┐      ┌─────────────────────────┐
//!   │   Logical databases     │◄─────│  Index / Bidirectional  │
//!   │  SV | FKFV-MV | VKVV-MV │      │  converters, ResultSet  │
//!   └────────────┬────────────┘      └─────────────────────────┘
//!                │ codec + ComparatorAdapter
//!                ▼
//!   ┌─────────────────────────────────────────────────────────┐
//!   │   Engine: namespaces, snapshot transactions, iterators  │
//!   └────────────────────────────┬────────────────────────────┘
//!                                ▼
//!                         ┌─────────────┐
//!                         │     WAL     │
//!                         └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod engine;
pub mod codec;
pub mod comparator;
pub mod logical;
pub mod index;
pub mod manager;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, HgError, Result};
pub use config::{Config, WalSyncStrategy};
pub use comparator::{ByteComparator, ComparatorAdapter, ComparatorRegistry};
pub use engine::{Engine, Transaction};
pub use index::{
    BidirectionalIndex, ByteConverter, BytesConverter, Count, GotoResult, I32Converter, I64Converter, Index,
    IndexStats, ResultSet, StringConverter,
};
pub use manager::IndexManager;
pub use store::{Handle, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of hgindex
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
