//! Per-generation statistics (STATISTICS component, bincode payload)

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

use super::{read_component, write_component, Component, Descriptor, STATS_MAGIC};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SSTableStats {
    pub row_count: u64,
    pub column_count: u64,
    pub data_length: u64,
    /// First row key in partitioner order
    pub first_key: Option<Vec<u8>>,
    /// Last row key in partitioner order
    pub last_key: Option<Vec<u8>>,
}

impl SSTableStats {
    /// Account for the next row (rows arrive in partitioner order)
    pub(crate) fn record_row(&mut self, key: &[u8], columns: usize) {
        if self.first_key.is_none() {
            self.first_key = Some(key.to_vec());
        }
        self.last_key = Some(key.to_vec());
        self.row_count += 1;
        self.column_count += columns as u64;
    }

    pub(crate) fn write(&self, descriptor: &Descriptor) -> Result<()> {
        let payload = bincode::serialize(self)
            .map_err(|e| StoreError::Serialization(format!("statistics: {}", e)))?;
        write_component(descriptor, Component::Statistics, STATS_MAGIC, &payload)
    }

    pub(crate) fn read(descriptor: &Descriptor, data_length: u64) -> Result<Self> {
        let payload = read_component(descriptor, Component::Statistics, STATS_MAGIC)?;
        let invalid = |reason: String| StoreError::InvalidComponent {
            path: descriptor.filename_for(Component::Statistics),
            reason,
        };

        let stats: SSTableStats = bincode::deserialize(&payload).map_err(|e| invalid(e.to_string()))?;
        if stats.data_length != data_length {
            return Err(invalid(format!(
                "written for {} bytes of data, data is {} bytes",
                stats.data_length, data_length
            )));
        }
        Ok(stats)
    }
}
