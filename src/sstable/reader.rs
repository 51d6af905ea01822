//! SSTable Reader
//!
//! Opens an SSTable generation and serves point lookups through the
//! in-memory primary index and bloom filter.
//!
//! ## Recovery
//! DATA is authoritative. When the derived components are missing or fail
//! validation, [`SSTableReader::open_or_rebuild`] re-derives them with a
//! full sequential scan of DATA. A reader only exists once every component
//! is valid; a failed rebuild leaves no derived component behind.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::StorageContext;
use crate::db::{serializer, Column, ColumnFamily, Row};
use crate::dht::DecoratedKey;
use crate::error::{Result, StoreError};

use super::scanner::read_record;
use super::{
    remove_derived, BloomFilter, Component, DataScanner, Descriptor, PrimaryIndex, SSTableStats,
};

/// Reader for one fully valid SSTable generation
pub struct SSTableReader {
    descriptor: Descriptor,
    ctx: Arc<StorageContext>,
    data_path: PathBuf,
    /// DATA handle for point reads; seeks need exclusive access
    data: Mutex<BufReader<File>>,
    data_length: u64,
    index: PrimaryIndex,
    filter: BloomFilter,
    stats: SSTableStats,
}

impl SSTableReader {
    /// Open a generation whose components are all present and valid.
    ///
    /// Errors:
    /// - `MissingDataComponent`: DATA is absent (unrecoverable)
    /// - `MissingComponent` / `InvalidComponent`: a derived component needs a rebuild
    pub fn open(descriptor: &Descriptor, ctx: &Arc<StorageContext>) -> Result<Self> {
        let data_path = descriptor.filename_for(Component::Data);
        if !data_path.is_file() {
            return Err(StoreError::MissingDataComponent(data_path));
        }
        let data_length = std::fs::metadata(&data_path)?.len();

        let index = PrimaryIndex::read(descriptor, data_length, ctx.partitioner().as_ref())?;
        let filter = BloomFilter::read(descriptor, data_length)?;
        let stats = SSTableStats::read(descriptor, data_length)?;

        if stats.row_count != index.len() as u64 {
            return Err(StoreError::InvalidComponent {
                path: descriptor.filename_for(Component::Statistics),
                reason: format!(
                    "records {} rows, index holds {}",
                    stats.row_count,
                    index.len()
                ),
            });
        }

        Self::from_parts(descriptor.clone(), Arc::clone(ctx), index, filter, stats)
    }

    /// Open a generation, rebuilding its derived components if needed
    pub fn open_or_rebuild(descriptor: &Descriptor, ctx: &Arc<StorageContext>) -> Result<Self> {
        match Self::open(descriptor, ctx) {
            Ok(reader) => Ok(reader),
            Err(e) if e.is_recoverable_component() => {
                tracing::warn!("Rebuilding derived components of {}: {}", descriptor, e);
                Self::rebuild(descriptor, ctx)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-derive PRIMARY_INDEX, FILTER and STATISTICS from a full DATA scan.
    ///
    /// Existing derived components are discarded first and never consulted.
    /// Any inconsistent row aborts with `CorruptDataComponent`.
    pub fn rebuild(descriptor: &Descriptor, ctx: &Arc<StorageContext>) -> Result<Self> {
        let data_path = descriptor.filename_for(Component::Data);
        if !data_path.is_file() {
            return Err(StoreError::MissingDataComponent(data_path));
        }

        tracing::info!("Rebuilding sstable {} from its data component", descriptor);
        remove_derived(descriptor)?;

        match Self::rebuild_from_scan(descriptor, ctx) {
            Ok(reader) => {
                tracing::info!(
                    "Rebuilt sstable {} ({} rows)",
                    descriptor,
                    reader.row_count()
                );
                Ok(reader)
            }
            Err(e) => {
                tracing::error!("Rebuild of {} failed: {}", descriptor, e);
                // never leave partial derived state behind
                if let Err(cleanup) = remove_derived(descriptor) {
                    tracing::warn!("Cleanup after failed rebuild of {}: {}", descriptor, cleanup);
                }
                Err(e)
            }
        }
    }

    fn rebuild_from_scan(descriptor: &Descriptor, ctx: &Arc<StorageContext>) -> Result<Self> {
        let scanner = DataScanner::open(descriptor, Arc::clone(ctx.partitioner()))?;
        let data_path = scanner.path().to_path_buf();
        let data_length = scanner.data_length();

        let mut index = PrimaryIndex::default();
        let mut stats = SSTableStats {
            data_length,
            ..SSTableStats::default()
        };

        for row in scanner {
            let row = row?;
            let corrupt = |reason: String| StoreError::CorruptDataComponent {
                path: data_path.clone(),
                offset: row.offset,
                reason,
            };

            let columns = row.decode().map_err(|e| corrupt(e.to_string()))?;
            stats.record_row(row.key.key(), columns.len());
            index
                .push(row.key.clone(), row.offset)
                .map_err(|e| corrupt(e.to_string()))?;
        }

        let filter = BloomFilter::from_keys(
            index.keys().map(|k| k.key()),
            index.len(),
            ctx.config().bloom_filter_fp_chance,
        );

        index.write(descriptor, data_length)?;
        filter.write(descriptor, data_length)?;
        stats.write(descriptor)?;

        Self::from_parts(descriptor.clone(), Arc::clone(ctx), index, filter, stats)
    }

    /// Assemble a reader from validated parts
    pub(crate) fn from_parts(
        descriptor: Descriptor,
        ctx: Arc<StorageContext>,
        index: PrimaryIndex,
        filter: BloomFilter,
        stats: SSTableStats,
    ) -> Result<Self> {
        let data_path = descriptor.filename_for(Component::Data);
        let file = File::open(&data_path)?;
        let data_length = file.metadata()?.len();

        Ok(Self {
            descriptor,
            ctx,
            data_path,
            data: Mutex::new(BufReader::new(file)),
            data_length,
            index,
            filter,
            stats,
        })
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Get a row's columns, or `None` if the key is not in this generation
    pub fn get_row(&self, key: &[u8]) -> Result<Option<ColumnFamily>> {
        match self.read_serialized(key)? {
            Some(bytes) => Ok(Some(serializer::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get a single column through the row's offset table
    pub fn get_column(&self, key: &[u8], name: &[u8]) -> Result<Option<Column>> {
        match self.read_serialized(key)? {
            Some(bytes) => serializer::find_column(&bytes, name),
            None => Ok(None),
        }
    }

    fn read_serialized(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.filter.may_contain(key) {
            return Ok(None);
        }
        let decorated = self.ctx.decorate(key);
        let offset = match self.index.position_of(&decorated) {
            Some(offset) => offset,
            None => return Ok(None),
        };

        let mut file = self.data.lock();
        file.seek(SeekFrom::Start(offset))?;
        let record = read_record(&mut *file, &self.data_path, offset, self.data_length)?;
        if record.key != key {
            return Err(StoreError::Storage(format!(
                "index of {} points at the wrong row for key {}",
                self.descriptor, decorated
            )));
        }
        Ok(Some(record.columns))
    }

    /// Bloom filter check; false means the key is definitely absent
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.filter.may_contain(key)
    }

    /// DATA offset of a row, via the primary index
    pub fn position_of(&self, key: &[u8]) -> Option<u64> {
        self.index.position_of(&self.ctx.decorate(key))
    }

    /// Row keys in partitioner order
    pub fn keys(&self) -> impl Iterator<Item = &DecoratedKey> {
        self.index.keys()
    }

    /// Sequential scan over this generation's DATA with a fresh file handle
    pub fn scanner(&self) -> Result<DataScanner> {
        DataScanner::open(&self.descriptor, Arc::clone(self.ctx.partitioner()))
    }

    /// Decoded rows in partitioner order
    pub fn rows(&self) -> Result<impl Iterator<Item = Result<Row>>> {
        Ok(self.scanner()?.map(|raw| -> Result<Row> {
            let raw = raw?;
            let columns = raw.decode()?;
            Ok(Row::new(raw.key, columns))
        }))
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn row_count(&self) -> u64 {
        self.stats.row_count
    }

    pub fn data_length(&self) -> u64 {
        self.data_length
    }

    pub fn stats(&self) -> &SSTableStats {
        &self.stats
    }

    pub fn index(&self) -> &PrimaryIndex {
        &self.index
    }

    pub fn filter(&self) -> &BloomFilter {
        &self.filter
    }

    pub fn first_key(&self) -> Option<&DecoratedKey> {
        self.index.first_key()
    }

    pub fn last_key(&self) -> Option<&DecoratedKey> {
        self.index.last_key()
    }
}

impl std::fmt::Debug for SSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableReader")
            .field("descriptor", &self.descriptor)
            .field("rows", &self.stats.row_count)
            .field("data_length", &self.data_length)
            .finish()
    }
}
