//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{EngineError, EngineResult};

use super::{WalEntry, HEADER_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last entry returned
    position: u64,
    /// File length at open time
    len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns:
    /// - `Ok(Some(entry))`: an intact entry
    /// - `Ok(None)`: clean end of log
    /// - `Err(PartialWrite)`: torn header or payload at the tail
    /// - `Err(Corruption)`: checksum mismatch
    pub fn next_entry(&mut self) -> EngineResult<Option<WalEntry>> {
        let remaining = self.len - self.position;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            return Err(EngineError::PartialWrite(format!(
                "partial header at offset {} ({} bytes)",
                self.position, remaining
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;
        let lsn = u64::from_le_bytes([
            header[0], header[1], header[2], header[3], header[4], header[5], header[6], header[7],
        ]);
        let crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let payload_len = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as u64;

        if remaining - (HEADER_SIZE as u64) < payload_len {
            return Err(EngineError::PartialWrite(format!(
                "partial payload at offset {}: expected {} bytes",
                self.position, payload_len
            )));
        }

        let mut payload = vec![0u8; payload_len as usize];
        self.reader.read_exact(&mut payload)?;

        let entry = WalEntry::decode(lsn, crc, &payload)?;
        self.position += HEADER_SIZE as u64 + payload_len;
        Ok(Some(entry))
    }

    /// Offset just past the last intact entry read so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries; yields the first error and then stops
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = EngineResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
