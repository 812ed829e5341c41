//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::EngineResult;

use super::{Record, WalEntry, WalReader};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// LSN the next append will receive
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    unsynced: usize,
    /// Current file length in bytes
    size: u64,
}

impl WalWriter {
    /// Open or create a WAL file, positioned after its last intact entry
    ///
    /// The file is expected to have been through [`super::WalRecovery`]
    /// already; scanning stops at the first unreadable frame.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> EngineResult<Self> {
        let mut last_lsn = 0;
        if path.exists() {
            let mut reader = WalReader::open(path)?;
            while let Ok(Some(entry)) = reader.next_entry() {
                last_lsn = entry.lsn;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn: last_lsn + 1,
            sync_strategy,
            unsynced: 0,
            size,
        })
    }

    /// Append a record, returning the LSN it was written at
    pub fn append(&mut self, record: Record) -> EngineResult<u64> {
        let lsn = self.next_lsn;
        let frame = WalEntry::new(lsn, record).encode()?;

        self.writer.write_all(&frame)?;
        self.next_lsn += 1;
        self.size += frame.len() as u64;
        self.unsynced += 1;

        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => self.sync()?,
            WalSyncStrategy::EveryNEntries { count } if self.unsynced >= count => self.sync()?,
            WalSyncStrategy::EveryNEntries { .. } => self.writer.flush()?,
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> EngineResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Get the LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Current size of the log in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
