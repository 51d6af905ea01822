//! Primary index: sorted row key → DATA offset
//!
//! Payload layout:
//! ```text
//! [DataLength: u64][Count: u64]
//! Count × [KeyLen: u32][Key][Offset: u64]
//! ```

use crate::codec::ByteReader;
use crate::dht::{DecoratedKey, Partitioner};
use crate::error::{Result, StoreError};

use super::{read_component, write_component, Component, Descriptor, DATA_HEADER_SIZE, INDEX_MAGIC};

/// One row's position in the DATA component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: DecoratedKey,
    pub offset: u64,
}

/// Entries sorted by partitioner order, offsets strictly increasing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryIndex {
    entries: Vec<IndexEntry>,
}

impl PrimaryIndex {
    /// Append the next row; rejects keys or offsets that do not increase
    pub fn push(&mut self, key: DecoratedKey, offset: u64) -> Result<()> {
        if let Some(last) = self.entries.last() {
            if key <= last.key {
                return Err(StoreError::Storage(format!(
                    "row key {} does not sort after {}",
                    key, last.key
                )));
            }
            if offset <= last.offset {
                return Err(StoreError::Storage(format!(
                    "row offset {} does not follow {}",
                    offset, last.offset
                )));
            }
        }
        self.entries.push(IndexEntry { key, offset });
        Ok(())
    }

    /// O(log n) lookup of a row's DATA offset
    pub fn position_of(&self, key: &DecoratedKey) -> Option<u64> {
        self.entries
            .binary_search_by(|entry| entry.key.cmp(key))
            .ok()
            .map(|idx| self.entries[idx].offset)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = &DecoratedKey> {
        self.entries.iter().map(|e| &e.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_key(&self) -> Option<&DecoratedKey> {
        self.entries.first().map(|e| &e.key)
    }

    pub fn last_key(&self) -> Option<&DecoratedKey> {
        self.entries.last().map(|e| &e.key)
    }

    // =========================================================================
    // Component I/O
    // =========================================================================

    pub(crate) fn write(&self, descriptor: &Descriptor, data_length: u64) -> Result<()> {
        let key_bytes: usize = self.entries.iter().map(|e| e.key.key().len()).sum();
        let mut payload = Vec::with_capacity(16 + key_bytes + self.entries.len() * 12);

        payload.extend_from_slice(&data_length.to_le_bytes());
        payload.extend_from_slice(&(self.entries.len() as u64).to_le_bytes());
        for entry in &self.entries {
            let key = entry.key.key();
            payload.extend_from_slice(&(key.len() as u32).to_le_bytes());
            payload.extend_from_slice(key);
            payload.extend_from_slice(&entry.offset.to_le_bytes());
        }

        write_component(descriptor, Component::PrimaryIndex, INDEX_MAGIC, &payload)
    }

    /// Load and validate the PRIMARY_INDEX component against the DATA length
    pub(crate) fn read(
        descriptor: &Descriptor,
        data_length: u64,
        partitioner: &dyn Partitioner,
    ) -> Result<Self> {
        let payload = read_component(descriptor, Component::PrimaryIndex, INDEX_MAGIC)?;
        let invalid = |reason: String| StoreError::InvalidComponent {
            path: descriptor.filename_for(Component::PrimaryIndex),
            reason,
        };

        let mut reader = ByteReader::new(&payload);
        let recorded = reader.u64().map_err(|e| invalid(e.to_string()))?;
        if recorded != data_length {
            return Err(invalid(format!(
                "written for {} bytes of data, data is {} bytes",
                recorded, data_length
            )));
        }

        let count = reader.u64().map_err(|e| invalid(e.to_string()))?;
        // smallest entry is 12 bytes
        let mut index = PrimaryIndex {
            entries: Vec::with_capacity((count as usize).min(reader.remaining() / 12)),
        };
        for _ in 0..count {
            let key_len = reader.u32().map_err(|e| invalid(e.to_string()))? as usize;
            let key = reader.bytes(key_len).map_err(|e| invalid(e.to_string()))?;
            let offset = reader.u64().map_err(|e| invalid(e.to_string()))?;
            if offset < DATA_HEADER_SIZE || offset >= data_length {
                return Err(invalid(format!("offset {} outside data component", offset)));
            }
            index
                .push(partitioner.decorate(key), offset)
                .map_err(|e| invalid(e.to_string()))?;
        }
        if !reader.is_empty() {
            return Err(invalid(format!("{} trailing bytes", reader.remaining())));
        }

        Ok(index)
    }
}
