//! ColumnFamily: the columns of one row, sorted by the table comparator

use std::cmp::Ordering;

use crate::clock::reconcile;
use crate::error::{Result, StoreError};
use crate::marshal::ColumnComparator;

use super::Column;

/// Ordered set of uniquely named columns
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnFamily {
    comparator: ColumnComparator,
    /// Sorted by `comparator`, names unique
    columns: Vec<Column>,
}

impl ColumnFamily {
    pub fn new(comparator: ColumnComparator) -> Self {
        Self {
            comparator,
            columns: Vec::new(),
        }
    }

    /// Build from columns already in comparator order (deserialization path)
    pub(crate) fn from_sorted(comparator: ColumnComparator, columns: Vec<Column>) -> Result<Self> {
        for pair in columns.windows(2) {
            if comparator.compare(pair[0].name(), pair[1].name()) != Ordering::Less {
                return Err(StoreError::Serialization(
                    "column names out of order or duplicated".to_string(),
                ));
            }
        }
        Ok(Self {
            comparator,
            columns,
        })
    }

    pub fn comparator(&self) -> ColumnComparator {
        self.comparator
    }

    /// Add a column, reconciling with any existing column of the same name
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        self.comparator.validate(column.name())?;

        match self.position(column.name()) {
            Ok(idx) => {
                let keep_new = std::ptr::eq(reconcile(&self.columns[idx], &column)?, &column);
                if keep_new {
                    self.columns[idx] = column;
                }
            }
            Err(idx) => self.columns.insert(idx, column),
        }
        Ok(())
    }

    /// Reconcile every column of `other` into this family
    pub fn merge(&mut self, other: &ColumnFamily) -> Result<()> {
        for column in other.iter() {
            self.add_column(column.clone())?;
        }
        Ok(())
    }

    pub fn get_column(&self, name: &[u8]) -> Option<&Column> {
        self.position(name).ok().map(|idx| &self.columns[idx])
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn clear(&mut self) {
        self.columns.clear();
    }

    /// Approximate in-memory footprint of all columns
    pub fn size(&self) -> usize {
        self.columns.iter().map(Column::size).sum()
    }

    fn position(&self, name: &[u8]) -> std::result::Result<usize, usize> {
        self.columns
            .binary_search_by(|c| self.comparator.compare(c.name(), name))
    }
}

impl<'a> IntoIterator for &'a ColumnFamily {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
