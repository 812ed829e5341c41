//! Configuration for hgindex
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{HgError, Result};

/// Main configuration for a store instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── wal.log          (write-ahead log, the only durable state)
    pub data_dir: PathBuf,

    /// Create `data_dir` when it does not exist
    pub create_if_missing: bool,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Rewrite the WAL once it grows past this many bytes (0 = never)
    pub wal_compaction_threshold: u64,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./hgindex_data"),
            create_if_missing: true,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            wal_compaction_threshold: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the settings that cannot be corrected later
    pub fn validate(&self) -> Result<()> {
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(HgError::Config(
                "EveryNEntries sync strategy needs a positive count".to_string(),
            ));
        }
        if !self.create_if_missing && !self.data_dir.exists() {
            return Err(HgError::Config(format!(
                "data directory {} does not exist and create_if_missing is off",
                self.data_dir.display()
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Whether to create the data directory when missing
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the WAL size (in bytes) that triggers compaction
    pub fn wal_compaction_threshold(mut self, bytes: u64) -> Self {
        self.config.wal_compaction_threshold = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
