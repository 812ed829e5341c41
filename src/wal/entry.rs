//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Frame header: LSN (8) + CRC (4) + payload length (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The logged change
    pub record: Record,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Changes that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    /// A namespace came into existence
    CreateNamespace { id: u32, name: String },

    /// A namespace and all of its records were dropped
    DropNamespace { id: u32 },

    /// A transaction committed at sequence number `seq`
    Commit { seq: u64, writes: Vec<WriteOp> },
}

/// One key written by a committed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOp {
    /// Namespace id from the matching `CreateNamespace`
    pub namespace: u32,

    pub key: Vec<u8>,

    /// `None` is a delete
    pub value: Option<Vec<u8>>,
}

impl WalEntry {
    /// Create an entry stamped with the current wall clock time
    pub fn new(lsn: u64, record: Record) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            lsn,
            record,
            timestamp,
        }
    }

    /// Serialize into a complete frame (header + payload)
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        let payload = bincode::serialize(&(self.timestamp, &self.record))?;
        let crc = crc32fast::hash(&payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&self.lsn.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Rebuild an entry from a header's LSN and CRC and its payload bytes
    pub fn decode(lsn: u64, crc: u32, payload: &[u8]) -> EngineResult<Self> {
        let actual = crc32fast::hash(payload);
        if actual != crc {
            return Err(EngineError::Corruption(format!(
                "CRC mismatch at LSN {}: expected {:08x}, got {:08x}",
                lsn, crc, actual
            )));
        }

        let (timestamp, record): (u64, Record) = bincode::deserialize(payload)?;
        Ok(Self {
            lsn,
            record,
            timestamp,
        })
    }
}
