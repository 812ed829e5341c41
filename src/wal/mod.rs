//! Write-Ahead Log (WAL) Module
//!
//! The WAL is the engine's only durable state. Namespace lifecycle and
//! committed transactions are appended here and replayed on open.
//!
//! ## Guarantees
//! - A record is appended (and synced per [`WalSyncStrategy`]) before the
//!   change it describes becomes visible
//! - Every frame carries a CRC32 of its payload and a monotonic LSN
//! - Recovery replays the longest intact prefix and cuts off the rest
//!
//! ## Frame Layout
//! ```text
//!  0        8        12       16                16 + len
//!  ├────────┼────────┼────────┼─────────────────────┤
//!  │ LSN    │ CRC32  │ len    │ bincode(ts, Record) │
//!  │ u64 LE │ u32 LE │ u32 LE │                     │
//!  └────────┴────────┴────────┴─────────────────────┘
//!
//!  Record = CreateNamespace { id, name }
//!         | DropNamespace { id }
//!         | Commit { seq, writes: [(namespace, key, value | tombstone)] }
//! ```
//!
//! [`WalSyncStrategy`]: crate::config::WalSyncStrategy

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, Record, WriteOp, HEADER_SIZE};
pub use writer::WalWriter;
pub use reader::WalReader;
pub use recovery::{WalRecovery, RecoveryResult};
