//! Secondary index snapshot
//!
//! Maps `(column name, value)` to the row keys that held that value when the
//! index was built. Keys keep the order in which the build discovered them.
//! A snapshot is never mutated; rebuilding produces a new one.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::db::ColumnFamily;
use crate::dht::DecoratedKey;

#[derive(Debug, Default)]
pub struct SecondaryIndex {
    columns: BTreeSet<Vec<u8>>,
    entries: HashMap<(Vec<u8>, Vec<u8>), Vec<DecoratedKey>>,
}

impl SecondaryIndex {
    /// Whether `column` was indexed by this build
    pub fn covers(&self, column: &[u8]) -> bool {
        self.columns.contains(column)
    }

    /// Keys recorded for `column == value`, in discovery order
    pub fn lookup(&self, column: &[u8], value: &[u8]) -> &[DecoratedKey] {
        self.entries
            .get(&(column.to_vec(), value.to_vec()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn columns(&self) -> impl Iterator<Item = &[u8]> {
        self.columns.iter().map(Vec::as_slice)
    }

    /// Number of distinct `(column, value)` entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates index entries row by row
pub struct SecondaryIndexBuilder {
    index: SecondaryIndex,
    seen: HashSet<(Vec<u8>, Vec<u8>, DecoratedKey)>,
}

impl SecondaryIndexBuilder {
    pub fn new<I, N>(columns: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Vec<u8>>,
    {
        Self {
            index: SecondaryIndex {
                columns: columns.into_iter().map(Into::into).collect(),
                entries: HashMap::new(),
            },
            seen: HashSet::new(),
        }
    }

    /// Start from an existing snapshot, keeping its columns and entries
    pub fn from_index(index: &SecondaryIndex) -> Self {
        let mut seen = HashSet::new();
        for ((column, value), keys) in &index.entries {
            for key in keys {
                seen.insert((column.clone(), value.clone(), key.clone()));
            }
        }
        Self {
            index: SecondaryIndex {
                columns: index.columns.clone(),
                entries: index.entries.clone(),
            },
            seen,
        }
    }

    /// Record every live indexed column of one row
    pub fn index_row(&mut self, key: &DecoratedKey, columns: &ColumnFamily) {
        for column in columns.iter() {
            if column.is_tombstone() || !self.index.columns.contains(column.name()) {
                continue;
            }
            let seen_key = (column.name().to_vec(), column.value().to_vec(), key.clone());
            if !self.seen.insert(seen_key) {
                continue;
            }
            self.index
                .entries
                .entry((column.name().to_vec(), column.value().to_vec()))
                .or_default()
                .push(key.clone());
        }
    }

    pub fn build(self) -> SecondaryIndex {
        self.index
    }
}
