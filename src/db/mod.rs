//! DB Module
//!
//! Row data model: columns, column families, rows and mutations, plus the
//! on-disk column family encoding.

mod column;
mod column_family;
pub mod serializer;

pub use column::Column;
pub use column_family::ColumnFamily;

use crate::clock::ColumnClock;
use crate::dht::DecoratedKey;
use crate::error::Result;
use crate::marshal::ColumnComparator;

/// A row key together with its columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: DecoratedKey,
    pub columns: ColumnFamily,
}

impl Row {
    pub fn new(key: DecoratedKey, columns: ColumnFamily) -> Self {
        Self { key, columns }
    }
}

/// A batch of column writes and deletes against one row
#[derive(Debug, Clone)]
pub struct RowMutation {
    key: Vec<u8>,
    columns: ColumnFamily,
}

impl RowMutation {
    pub fn new(key: impl Into<Vec<u8>>, comparator: ColumnComparator) -> Self {
        Self {
            key: key.into(),
            columns: ColumnFamily::new(comparator),
        }
    }

    /// Write `value` into column `name`
    pub fn add(
        &mut self,
        name: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        clock: impl Into<ColumnClock>,
    ) -> Result<()> {
        self.columns.add_column(Column::new(name, value, clock))
    }

    /// Delete column `name`
    pub fn delete(&mut self, name: impl Into<Vec<u8>>, clock: impl Into<ColumnClock>) -> Result<()> {
        self.columns.add_column(Column::tombstone(name, clock))
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn columns(&self) -> &ColumnFamily {
        &self.columns
    }

    pub fn into_parts(self) -> (Vec<u8>, ColumnFamily) {
        (self.key, self.columns)
    }
}
