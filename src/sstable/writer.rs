//! SSTable Writer
//!
//! Streams rows into a new DATA component and derives the PRIMARY_INDEX,
//! FILTER and STATISTICS components as a byproduct.
//!
//! DATA is written under a temporary name and only renamed into place once
//! every derived component is on disk, so an abandoned or failed write never
//! leaves a generation that discovery would pick up.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::Arc;

use crate::context::StorageContext;
use crate::db::{serializer, ColumnFamily};
use crate::dht::DecoratedKey;
use crate::error::{Result, StoreError};

use super::{
    remove_derived, BloomFilter, Component, Descriptor, PrimaryIndex, SSTableReader,
    SSTableStats, DATA_HEADER_SIZE, DATA_MAGIC, MAX_FIELD_LEN, VERSION,
};

/// Writer for one new SSTable generation. Rows must arrive in strictly
/// increasing partitioner order.
pub struct SSTableWriter {
    descriptor: Descriptor,
    ctx: Arc<StorageContext>,
    /// Buffered writer for the DATA component
    writer: BufWriter<File>,
    /// Current write position (next row offset)
    current_offset: u64,
    index: PrimaryIndex,
    stats: SSTableStats,
    /// Declared after `writer` so the buffer is dropped before cleanup runs
    pending: PendingGeneration,
}

impl SSTableWriter {
    /// Start a new DATA component and write its header.
    ///
    /// Fails if the generation already has a DATA component: written data is
    /// never modified.
    pub fn create(descriptor: &Descriptor, ctx: &Arc<StorageContext>) -> Result<Self> {
        fs::create_dir_all(descriptor.directory())?;

        let path = descriptor.filename_for(Component::Data);
        if path.exists() {
            return Err(StoreError::Storage(format!("{} already exists", path.display())));
        }

        // a leftover temp file belongs to a writer that never finished
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(descriptor.temp_filename_for(Component::Data))?;
        let pending = PendingGeneration::new(descriptor.clone());

        let mut writer = BufWriter::new(file);
        writer.write_all(DATA_MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;

        tracing::debug!("Writing sstable {}", descriptor);

        Ok(Self {
            descriptor: descriptor.clone(),
            ctx: Arc::clone(ctx),
            writer,
            current_offset: DATA_HEADER_SIZE,
            index: PrimaryIndex::default(),
            stats: SSTableStats::default(),
            pending,
        })
    }

    /// Serialize and append a row
    pub fn append(&mut self, key: &[u8], columns: &ColumnFamily) -> Result<()> {
        let serialized = serializer::to_bytes(columns)?;
        self.write_row(key, &serialized, columns.len())
    }

    /// Append a row whose column family is already serialized.
    /// The bytes are validated before anything is written.
    pub fn append_raw(&mut self, key: &[u8], serialized: &[u8]) -> Result<()> {
        let columns = serializer::deserialize(serialized)?;
        self.write_row(key, serialized, columns.len())
    }

    fn write_row(&mut self, key: &[u8], serialized: &[u8], column_count: usize) -> Result<()> {
        if key.len() as u64 > MAX_FIELD_LEN || serialized.len() as u64 > MAX_FIELD_LEN {
            return Err(StoreError::Validation(format!(
                "row of {} key bytes / {} column bytes is too large",
                key.len(),
                serialized.len()
            )));
        }

        let decorated: DecoratedKey = self.ctx.decorate(key);
        // ordering is checked before any byte reaches the file
        if self.index.last_key().is_some_and(|last| &decorated <= last) {
            return Err(StoreError::Storage(format!(
                "row key {} appended out of partitioner order",
                decorated
            )));
        }

        let record = encode_record(key, serialized);
        self.writer.write_all(&record)?;

        self.index.push(decorated, self.current_offset)?;
        self.stats.record_row(key, column_count);
        self.current_offset += record.len() as u64;
        Ok(())
    }

    /// Number of rows written so far
    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    /// Finish the DATA component, write the derived components and open a reader
    pub fn finish(mut self) -> Result<SSTableReader> {
        self.writer.flush()?;
        let file = self.writer.into_inner().map_err(|e| {
            StoreError::Storage(format!("Failed to flush sstable: {}", e))
        })?;
        file.sync_all()?;
        drop(file);

        let data_length = self.current_offset;
        self.stats.data_length = data_length;

        let filter = BloomFilter::from_keys(
            self.index.keys().map(|k| k.key()),
            self.index.len(),
            self.ctx.config().bloom_filter_fp_chance,
        );

        self.index.write(&self.descriptor, data_length)?;
        filter.write(&self.descriptor, data_length)?;
        self.stats.write(&self.descriptor)?;

        fs::rename(
            self.descriptor.temp_filename_for(Component::Data),
            self.descriptor.filename_for(Component::Data),
        )?;
        self.pending.disarm();

        tracing::info!(
            "Wrote sstable {} ({} rows, {} bytes)",
            self.descriptor,
            self.stats.row_count,
            data_length
        );

        SSTableReader::from_parts(self.descriptor, self.ctx, self.index, filter, self.stats)
    }
}

/// Deletes the files of a generation whose writer never finished
struct PendingGeneration {
    descriptor: Descriptor,
    armed: bool,
}

impl PendingGeneration {
    fn new(descriptor: Descriptor) -> Self {
        Self {
            descriptor,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGeneration {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let tmp = self.descriptor.temp_filename_for(Component::Data);
        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", tmp.display(), e);
            }
        }
        if let Err(e) = remove_derived(&self.descriptor) {
            tracing::warn!("Cleanup of unfinished sstable {}: {}", self.descriptor, e);
        }
        tracing::debug!("Discarded unfinished sstable {}", self.descriptor);
    }
}

/// [KeyLen: u32][Key][CfLen: u32][ColumnFamily][CRC: u32]
fn encode_record(key: &[u8], serialized: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(12 + key.len() + serialized.len());
    record.extend_from_slice(&(key.len() as u32).to_le_bytes());
    record.extend_from_slice(key);
    record.extend_from_slice(&(serialized.len() as u32).to_le_bytes());
    record.extend_from_slice(serialized);
    let crc = crc32fast::hash(&record);
    record.extend_from_slice(&crc.to_le_bytes());
    record
}

/// Write already-serialized rows in any order as a new generation.
///
/// Entries are sorted into partitioner order first; duplicate keys are rejected.
pub fn write_raw_sstable<I>(
    descriptor: &Descriptor,
    ctx: &Arc<StorageContext>,
    entries: I,
) -> Result<SSTableReader>
where
    I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
{
    let mut rows: Vec<(DecoratedKey, Vec<u8>)> = entries
        .into_iter()
        .map(|(key, columns)| (ctx.decorate(&key), columns))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut writer = SSTableWriter::create(descriptor, ctx)?;
    for (key, columns) in &rows {
        writer.append_raw(key.key(), columns)?;
    }
    writer.finish()
}
