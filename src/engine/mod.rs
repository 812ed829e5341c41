//! Embedded ordered key/value engine
//!
//! The storage the index layer is built on: a set of independently ordered
//! namespaces, snapshot-isolated optimistic transactions and bounded
//! iterators, made durable by the write-ahead log.
//!
//! ## Architecture
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   Engine                     │
//! │                                              │
//! │  Transaction ──► write set (per namespace)   │
//! │       │                 │ commit             │
//! │       │ read            ▼                    │
//! │       │          ┌─────────────┐             │
//! │       │          │     WAL     │  durable    │
//! │       │          └──────┬──────┘             │
//! │       ▼                 ▼ apply              │
//! │  ┌─────────────────────────────────────┐     │
//! │  │ Namespace (BTreeMap, own comparator)│ ... │
//! │  │  key -> [(seq, value | tombstone)]  │     │
//! │  └─────────────────────────────────────┘     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Responsibilities
//! - Namespace lifecycle (create, drop, discovery at open)
//! - Snapshot reads with read-your-writes
//! - Optimistic commit with conflict detection
//! - Range estimation and WAL compaction

mod comparator;
mod db;
mod iterator;
pub(crate) mod namespace;
mod transaction;

pub use comparator::{BytewiseComparator, KeyComparator};
pub use db::{Engine, NamespaceDescriptor, RangeEstimate};
pub use iterator::EngineIterator;
pub use namespace::Namespace;
pub use transaction::Transaction;
