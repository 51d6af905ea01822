//! Store Module
//!
//! The live table store: one memtable plus the registered SSTables of a
//! table, a secondary index over selected columns, and predicate + token
//! range scans that reconcile every version of a row before matching it.

mod index;
mod query;
mod table;

use std::collections::BTreeSet;

pub use index::{SecondaryIndex, SecondaryIndexBuilder};
pub use query::{IndexClause, IndexExpression, IndexOperator, QueryFilter};
pub use table::ColumnFamilyStore;

use crate::error::{Result, StoreError};
use crate::marshal::ColumnComparator;

/// Schema of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    keyspace: String,
    name: String,
    comparator: ColumnComparator,
    indexed_columns: BTreeSet<Vec<u8>>,
}

impl TableMetadata {
    pub fn new(keyspace: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let keyspace = keyspace.into();
        let name = name.into();
        if keyspace.is_empty() || name.is_empty() {
            return Err(StoreError::Validation(
                "keyspace and table name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            keyspace,
            name,
            comparator: ColumnComparator::default(),
            indexed_columns: BTreeSet::new(),
        })
    }

    pub fn with_comparator(mut self, comparator: ColumnComparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Mark `column` as carrying a secondary index
    pub fn with_indexed_column(mut self, column: impl Into<Vec<u8>>) -> Self {
        self.indexed_columns.insert(column.into());
        self
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comparator(&self) -> ColumnComparator {
        self.comparator
    }

    pub fn indexed_columns(&self) -> &BTreeSet<Vec<u8>> {
        &self.indexed_columns
    }
}
