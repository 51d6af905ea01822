//! Storage Context
//!
//! Explicit handle to the process-level collaborators (configuration and
//! partitioner) that writers, readers, rebuild jobs and scans need. Passed
//! in rather than looked up globally so every component can be exercised
//! in isolation.

use std::sync::Arc;

use crate::config::Config;
use crate::dht::{DecoratedKey, Partitioner, Range};
use crate::error::Result;

/// Shared configuration and partitioner
#[derive(Debug, Clone)]
pub struct StorageContext {
    config: Config,
    partitioner: Arc<dyn Partitioner>,
}

impl StorageContext {
    /// Build a context from config, instantiating the configured partitioner
    pub fn new(config: Config) -> Result<Arc<Self>> {
        config.validate()?;
        let partitioner = config.partitioner.build();
        Ok(Arc::new(Self {
            config,
            partitioner,
        }))
    }

    /// Build a context with an explicit partitioner
    pub fn with_partitioner(config: Config, partitioner: Arc<dyn Partitioner>) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            partitioner,
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn partitioner(&self) -> &Arc<dyn Partitioner> {
        &self.partitioner
    }

    /// Map a raw key to its position on the ring
    pub fn decorate(&self, key: &[u8]) -> DecoratedKey {
        self.partitioner.decorate(key)
    }

    /// The range covering every token
    pub fn full_range(&self) -> Range {
        let min = self.partitioner.minimum_token();
        Range::new(min.clone(), min)
    }
}
