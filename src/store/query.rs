//! Index clauses and query filters

use std::collections::BTreeSet;

use crate::db::ColumnFamily;
use crate::error::Result;

/// Relation between a stored column value and the expression's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl IndexOperator {
    /// Byte-wise comparison of `stored` against `expected`
    pub fn matches(&self, stored: &[u8], expected: &[u8]) -> bool {
        match self {
            IndexOperator::Eq => stored == expected,
            IndexOperator::Gt => stored > expected,
            IndexOperator::Gte => stored >= expected,
            IndexOperator::Lt => stored < expected,
            IndexOperator::Lte => stored <= expected,
        }
    }
}

/// One predicate over a single column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexExpression {
    pub column: Vec<u8>,
    pub op: IndexOperator,
    pub value: Vec<u8>,
}

impl IndexExpression {
    pub fn new(column: impl Into<Vec<u8>>, op: IndexOperator, value: impl Into<Vec<u8>>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// The column must be present, live, and relate to `value` through `op`
    pub fn is_satisfied_by(&self, columns: &ColumnFamily) -> bool {
        match columns.get_column(&self.column) {
            Some(column) if !column.is_tombstone() => self.op.matches(column.value(), &self.value),
            _ => false,
        }
    }
}

/// Conjunction of expressions plus paging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexClause {
    pub expressions: Vec<IndexExpression>,
    /// Raw row key to start from; empty means no bound
    pub start_key: Vec<u8>,
    /// Maximum number of rows returned
    pub count: usize,
}

impl IndexClause {
    pub fn new(expressions: Vec<IndexExpression>, start_key: impl Into<Vec<u8>>, count: usize) -> Self {
        Self {
            expressions,
            start_key: start_key.into(),
            count,
        }
    }
}

/// Which columns of a matching row are returned
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryFilter {
    /// Every column, tombstones included
    #[default]
    Identity,
    /// Only the named columns
    Names(BTreeSet<Vec<u8>>),
    /// Columns between `start` and `finish` (inclusive, empty = unbounded)
    /// in comparator order, at most `count` live ones
    Slice {
        start: Vec<u8>,
        finish: Vec<u8>,
        count: usize,
    },
}

impl QueryFilter {
    pub fn names<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Vec<u8>>,
    {
        QueryFilter::Names(names.into_iter().map(Into::into).collect())
    }

    /// Materialize the selected columns of `columns`
    pub fn apply(&self, columns: &ColumnFamily) -> Result<ColumnFamily> {
        let comparator = columns.comparator();
        let mut out = ColumnFamily::new(comparator);

        match self {
            QueryFilter::Identity => return Ok(columns.clone()),
            QueryFilter::Names(names) => {
                for column in columns.iter().filter(|c| names.contains(c.name())) {
                    out.add_column(column.clone())?;
                }
            }
            QueryFilter::Slice {
                start,
                finish,
                count,
            } => {
                let mut live = 0;
                for column in columns.iter() {
                    if !start.is_empty() && comparator.compare(column.name(), start).is_lt() {
                        continue;
                    }
                    if !finish.is_empty() && comparator.compare(column.name(), finish).is_gt() {
                        break;
                    }
                    if live >= *count {
                        break;
                    }
                    if !column.is_tombstone() {
                        live += 1;
                    }
                    out.add_column(column.clone())?;
                }
            }
        }
        Ok(out)
    }
}
