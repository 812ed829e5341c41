//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was (or, for verify, would be) truncated after the
    /// last valid entry
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Stop at the first torn or corrupted entry (frames cannot be
    ///    resynchronised past it)
    /// 3. Truncate the file to the end of the last valid entry
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> EngineResult<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result, valid_len) = Self::scan(path)?;

        if result.was_truncated {
            warn!(
                path = %path.display(),
                valid_len,
                corrupted = result.entries_corrupted,
                "truncating WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it.
    ///
    /// `was_truncated` reports whether [`WalRecovery::recover`] would cut
    /// the file.
    pub fn verify(path: &Path) -> EngineResult<RecoveryResult> {
        let (_, result, _) = Self::scan(path)?;
        Ok(result)
    }

    fn scan(path: &Path) -> EngineResult<(Vec<WalEntry>, RecoveryResult, u64)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        loop {
            match reader.next_entry() {
                Ok(Some(entry)) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    entries.push(entry);
                }
                Ok(None) => break,
                Err(EngineError::PartialWrite(reason)) => {
                    debug!(offset = reader.position(), %reason, "WAL ends in a partial write");
                    result.was_truncated = true;
                    break;
                }
                Err(e @ EngineError::Corruption(_)) | Err(e @ EngineError::Serialization(_)) => {
                    warn!(offset = reader.position(), error = %e, "WAL entry unreadable");
                    result.entries_corrupted += 1;
                    result.was_truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((entries, result, reader.position()))
    }
}
