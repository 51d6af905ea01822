//! Configuration for cfstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::sync::Arc;

use crate::dht::{ByteOrderedPartitioner, HashPartitioner, Partitioner};
use crate::error::{Result, StoreError};

/// Main configuration for a cfstore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {keyspace}/
    ///           ├── {keyspace}-{table}-{generation}-Data.db
    ///           ├── {keyspace}-{table}-{generation}-Index.db
    ///           ├── {keyspace}-{table}-{generation}-Filter.db
    ///           └── {keyspace}-{table}-{generation}-Statistics.db
    pub data_dir: PathBuf,

    /// Target false-positive chance for per-SSTable bloom filters
    pub bloom_filter_fp_chance: f64,

    // -------------------------------------------------------------------------
    // Background Jobs
    // -------------------------------------------------------------------------
    /// Worker threads used by the rebuild executor
    pub rebuild_threads: usize,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Key Distribution
    // -------------------------------------------------------------------------
    /// Partitioner mapping row keys onto tokens
    pub partitioner: PartitionerKind,
}

/// Which partitioner orders row keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionerKind {
    /// Token is the raw key; rows are stored in key order
    ByteOrdered,

    /// Token is a crc32 hash of the key
    Hash,
}

impl PartitionerKind {
    /// Instantiate the partitioner
    pub fn build(self) -> Arc<dyn Partitioner> {
        match self {
            PartitionerKind::ByteOrdered => Arc::new(ByteOrderedPartitioner),
            PartitionerKind::Hash => Arc::new(HashPartitioner),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./cfstore_data"),
            bloom_filter_fp_chance: 0.01,
            rebuild_threads: 2,
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            partitioner: PartitionerKind::ByteOrdered,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.bloom_filter_fp_chance > 0.0 && self.bloom_filter_fp_chance < 1.0) {
            return Err(StoreError::Config(format!(
                "bloom_filter_fp_chance must be in (0, 1), got {}",
                self.bloom_filter_fp_chance
            )));
        }
        if self.rebuild_threads == 0 {
            return Err(StoreError::Config(
                "rebuild_threads must be at least 1".to_string(),
            ));
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

    /// Set the bloom filter false-positive chance
    pub fn bloom_filter_fp_chance(mut self, chance: f64) -> Self {
        self.config.bloom_filter_fp_chance = chance;
        self
    }

    /// Set the number of rebuild worker threads
    pub fn rebuild_threads(mut self, count: usize) -> Self {
        self.config.rebuild_threads = count;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the partitioner
    pub fn partitioner(mut self, kind: PartitionerKind) -> Self {
        self.config.partitioner = kind;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
