//! Memtable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::db::ColumnFamily;
use crate::dht::DecoratedKey;
use crate::error::Result;
use crate::marshal::ColumnComparator;

/// Live rows of one table
pub struct Memtable {
    rows: RwLock<BTreeMap<DecoratedKey, ColumnFamily>>,
    /// Approximate size in bytes (keys + columns)
    size: AtomicUsize,
    comparator: ColumnComparator,
}

impl Memtable {
    pub fn new(comparator: ColumnComparator) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
            comparator,
        }
    }

    /// Merge `columns` into the row at `key`, reconciling per column.
    ///
    /// The row is replaced only once every column reconciled, so a failed
    /// merge leaves it untouched. Returns the memtable size afterwards.
    pub fn apply(&self, key: DecoratedKey, columns: &ColumnFamily) -> Result<usize> {
        let mut rows = self.rows.write();

        let (merged, old_size) = match rows.get(&key) {
            Some(existing) => {
                let mut merged = existing.clone();
                merged.merge(columns)?;
                (merged, existing.size() + key.key().len())
            }
            None => {
                let mut merged = ColumnFamily::new(self.comparator);
                merged.merge(columns)?;
                (merged, 0)
            }
        };

        let new_size = merged.size() + key.key().len();
        rows.insert(key, merged);

        let size = if new_size >= old_size {
            self.size.fetch_add(new_size - old_size, Ordering::Relaxed) + (new_size - old_size)
        } else {
            self.size.fetch_sub(old_size - new_size, Ordering::Relaxed) - (old_size - new_size)
        };
        Ok(size)
    }

    /// Current columns of a row (read lock)
    pub fn get(&self, key: &DecoratedKey) -> Option<ColumnFamily> {
        self.rows.read().get(key).cloned()
    }

    /// Keys whose live `column` holds exactly `value`, in partitioner order
    pub fn keys_matching(&self, column: &[u8], value: &[u8]) -> Vec<DecoratedKey> {
        self.rows
            .read()
            .iter()
            .filter(|(_, cf)| {
                cf.get_column(column)
                    .is_some_and(|c| !c.is_tombstone() && c.value() == value)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// All rows in partitioner order (for flush and index builds)
    pub fn snapshot(&self) -> Vec<(DecoratedKey, ColumnFamily)> {
        self.rows
            .read()
            .iter()
            .map(|(k, cf)| (k.clone(), cf.clone()))
            .collect()
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Drop every row (after a successful flush)
    pub fn clear(&self) {
        let mut rows = self.rows.write();
        rows.clear();
        self.size.store(0, Ordering::Relaxed);
    }
}
