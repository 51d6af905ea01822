//! Column Family Store
//!
//! Coordinates the memtable and the registered SSTables of one table.
//!
//! ## Concurrency
//! - `sstables`: RwLock over immutable `Arc<SSTableReader>`s
//! - `index`: immutable snapshot, replaced wholesale on rebuild
//! - `write_lock`: serializes `apply` and `flush` so a flush never races
//!   a write into the memtable it is draining
//! - `next_generation`: atomic counter (lock-free)

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::clock::reconcile;
use crate::context::StorageContext;
use crate::db::{Column, ColumnFamily, Row, RowMutation};
use crate::dht::{DecoratedKey, Range};
use crate::error::{Result, StoreError};
use crate::memtable::Memtable;
use crate::sstable::{Descriptor, SSTableReader, SSTableWriter};

use super::{
    IndexClause, IndexOperator, QueryFilter, SecondaryIndex, SecondaryIndexBuilder, TableMetadata,
};

pub struct ColumnFamilyStore {
    metadata: TableMetadata,
    ctx: Arc<StorageContext>,
    /// `{data_dir}/{keyspace}`
    directory: PathBuf,
    memtable: Memtable,
    /// Registered generations, oldest first
    sstables: RwLock<Vec<Arc<SSTableReader>>>,
    index: RwLock<Option<Arc<SecondaryIndex>>>,
    next_generation: AtomicU64,
    write_lock: Mutex<()>,
}

impl ColumnFamilyStore {
    /// Open the store for `metadata`, registering every generation found on disk.
    ///
    /// Generations with missing or invalid derived components are rebuilt
    /// in place. Generations whose DATA is missing or corrupt are logged and
    /// left unregistered.
    pub fn open(ctx: Arc<StorageContext>, metadata: TableMetadata) -> Result<Self> {
        let directory = ctx.config().data_dir.join(metadata.keyspace());
        fs::create_dir_all(&directory)?;

        let mut sstables = Vec::new();
        let mut max_generation = 0;
        for descriptor in Descriptor::list(&directory)? {
            if descriptor.keyspace() != metadata.keyspace() || descriptor.table() != metadata.name() {
                continue;
            }
            max_generation = max_generation.max(descriptor.generation());

            match SSTableReader::open_or_rebuild(&descriptor, &ctx) {
                Ok(reader) => sstables.push(Arc::new(reader)),
                Err(e @ StoreError::MissingDataComponent(_))
                | Err(e @ StoreError::CorruptDataComponent { .. }) => {
                    tracing::warn!("Skipping sstable {}: {}", descriptor, e);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "Opened {}.{} with {} sstables",
            metadata.keyspace(),
            metadata.name(),
            sstables.len()
        );

        Ok(Self {
            memtable: Memtable::new(metadata.comparator()),
            metadata,
            ctx,
            directory,
            sstables: RwLock::new(sstables),
            index: RwLock::new(None),
            next_generation: AtomicU64::new(max_generation + 1),
            write_lock: Mutex::new(()),
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply a mutation to the memtable, flushing once it outgrows the limit.
    ///
    /// An error means the mutation was not applied. A failed automatic flush
    /// is logged and the rows stay in the memtable for the next attempt.
    pub fn apply(&self, mutation: &RowMutation) -> Result<()> {
        let _guard = self.write_lock.lock();

        let key = self.ctx.decorate(mutation.key());
        let size = self.memtable.apply(key, mutation.columns())?;
        if size >= self.ctx.config().memtable_size_limit {
            tracing::debug!("Memtable reached {} bytes, flushing", size);
            if let Err(e) = self.flush_locked() {
                tracing::warn!(
                    "Flush of {}.{} failed, keeping {} bytes in memory: {}",
                    self.metadata.keyspace(),
                    self.metadata.name(),
                    self.memtable.size(),
                    e
                );
            }
        }
        Ok(())
    }

    /// Write the memtable out as a new generation.
    /// Returns `None` when there was nothing to flush.
    pub fn flush(&self) -> Result<Option<Arc<SSTableReader>>> {
        let _guard = self.write_lock.lock();
        self.flush_locked()
    }

    fn flush_locked(&self) -> Result<Option<Arc<SSTableReader>>> {
        let rows = self.memtable.snapshot();
        if rows.is_empty() {
            return Ok(None);
        }

        let descriptor = self.next_descriptor()?;
        let mut writer = SSTableWriter::create(&descriptor, &self.ctx)?;
        for (key, columns) in &rows {
            writer.append(key.key(), columns)?;
        }
        let reader = Arc::new(writer.finish()?);

        self.add_sstable(Arc::clone(&reader));
        self.extend_index(&rows);
        self.memtable.clear();

        tracing::info!("Flushed {} rows to {}", rows.len(), descriptor);
        Ok(Some(reader))
    }

    /// Carry rows leaving the memtable into the current index snapshot
    fn extend_index(&self, rows: &[(DecoratedKey, ColumnFamily)]) {
        let mut slot = self.index.write();
        if let Some(current) = slot.as_ref() {
            let mut builder = SecondaryIndexBuilder::from_index(current);
            for (key, columns) in rows {
                builder.index_row(key, columns);
            }
            *slot = Some(Arc::new(builder.build()));
        }
    }

    /// Descriptor for the next unused generation of this table
    pub fn next_descriptor(&self) -> Result<Descriptor> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        Descriptor::new(
            &self.directory,
            self.metadata.keyspace(),
            self.metadata.name(),
            generation,
        )
    }

    /// Register an opened reader (e.g. one produced by a rebuild job)
    pub fn add_sstable(&self, reader: Arc<SSTableReader>) {
        self.next_generation
            .fetch_max(reader.descriptor().generation() + 1, Ordering::SeqCst);

        let mut sstables = self.sstables.write();
        if sstables.iter().any(|r| r.descriptor() == reader.descriptor()) {
            tracing::debug!("Sstable {} already registered", reader.descriptor());
            return;
        }
        tracing::debug!("Registered sstable {}", reader.descriptor());
        sstables.push(reader);
    }

    /// Registered readers, oldest first
    pub fn sstables(&self) -> Vec<Arc<SSTableReader>> {
        self.sstables.read().clone()
    }

    pub fn indexed_columns(&self) -> Vec<Vec<u8>> {
        self.metadata.indexed_columns().iter().cloned().collect()
    }

    // =========================================================================
    // Secondary Index
    // =========================================================================

    /// Build a fresh index over the memtable and then `readers`, in order,
    /// and swap it in as the current snapshot
    pub fn build_secondary_indexes(
        &self,
        readers: &[Arc<SSTableReader>],
        columns: &[Vec<u8>],
    ) -> Result<Arc<SecondaryIndex>> {
        let mut builder = SecondaryIndexBuilder::new(columns.iter().cloned());

        for (key, row) in self.memtable.snapshot() {
            builder.index_row(&key, &row);
        }
        for reader in readers {
            for row in reader.rows()? {
                let row = row?;
                builder.index_row(&row.key, &row.columns);
            }
        }

        let index = Arc::new(builder.build());
        tracing::info!(
            "Built secondary index over {} sstables ({} entries)",
            readers.len(),
            index.len()
        );
        *self.index.write() = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Current index snapshot, if one was built
    pub fn secondary_index(&self) -> Option<Arc<SecondaryIndex>> {
        self.index.read().clone()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Reconciled row at `key` with `filter` applied
    pub fn get_row(&self, key: &[u8], filter: &QueryFilter) -> Result<Option<Row>> {
        let decorated = self.ctx.decorate(key);
        match self.merged_row(&decorated)? {
            Some(columns) => Ok(Some(Row::new(decorated, filter.apply(&columns)?))),
            None => Ok(None),
        }
    }

    /// Reconciled single column, tombstones included
    pub fn get_column(&self, key: &[u8], name: &[u8]) -> Result<Option<Column>> {
        let decorated = self.ctx.decorate(key);
        let mut winner = self
            .memtable
            .get(&decorated)
            .and_then(|cf| cf.get_column(name).cloned());

        for reader in self.sstables.read().iter() {
            if let Some(column) = reader.get_column(key, name)? {
                winner = Some(match winner {
                    Some(current) => reconcile(&current, &column)?.clone(),
                    None => column,
                });
            }
        }
        Ok(winner)
    }

    /// Every version of a row (memtable, then each sstable) reconciled into one
    fn merged_row(&self, key: &DecoratedKey) -> Result<Option<ColumnFamily>> {
        let mut merged = self.memtable.get(key);

        for reader in self.sstables.read().iter() {
            if let Some(columns) = reader.get_row(key.key())? {
                match merged.as_mut() {
                    Some(existing) => existing.merge(&columns)?,
                    None => merged = Some(columns),
                }
            }
        }
        Ok(merged)
    }

    /// Rows in `range` satisfying every expression of `clause`.
    ///
    /// The first `Eq` expression over an indexed column drives candidate
    /// discovery: live memtable rows first, then the index snapshot. Each
    /// candidate is re-checked against its reconciled row, so stale index
    /// entries never surface.
    pub fn scan(&self, clause: &IndexClause, range: &Range, filter: &QueryFilter) -> Result<Vec<Row>> {
        let index = self.secondary_index();
        let primary = index.as_ref().and_then(|idx| {
            clause
                .expressions
                .iter()
                .find(|e| e.op == IndexOperator::Eq && idx.covers(&e.column))
        });
        let (Some(index), Some(primary)) = (index, primary) else {
            let columns: Vec<String> = clause
                .expressions
                .iter()
                .map(|e| String::from_utf8_lossy(&e.column).into_owned())
                .collect();
            return Err(StoreError::IndexNotBuilt(columns.join(", ")));
        };

        let start = if clause.start_key.is_empty() {
            None
        } else {
            Some(self.ctx.decorate(&clause.start_key))
        };

        let mut candidates = self.memtable.keys_matching(&primary.column, &primary.value);
        candidates.extend_from_slice(index.lookup(&primary.column, &primary.value));

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for key in candidates {
            if rows.len() >= clause.count {
                break;
            }
            if !seen.insert(key.clone()) {
                continue;
            }
            if !range.contains(key.token()) {
                continue;
            }
            if start.as_ref().is_some_and(|start| &key < start) {
                continue;
            }

            let columns = match self.merged_row(&key)? {
                Some(columns) => columns,
                None => continue,
            };
            if clause.expressions.iter().all(|e| e.is_satisfied_by(&columns)) {
                rows.push(Row::new(key, filter.apply(&columns)?));
            }
        }

        tracing::debug!(
            "Scan on {}.{} returned {} rows",
            self.metadata.keyspace(),
            self.metadata.name(),
            rows.len()
        );
        Ok(rows)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn context(&self) -> &Arc<StorageContext> {
        &self.ctx
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    pub fn memtable_row_count(&self) -> usize {
        self.memtable.row_count()
    }

    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }
}
