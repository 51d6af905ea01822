//! Marshal Module
//!
//! Orderings over serialized column names.

mod time_uuid;

use std::cmp::Ordering;

use crate::error::{Result, StoreError};

pub use time_uuid::{compare_time_uuids, TimeUuid};

/// Ordering applied to the column names of a column family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnComparator {
    /// Raw lexicographic byte order
    #[default]
    Bytes,

    /// Names are version 1 UUIDs ordered by embedded timestamp
    TimeUuid,
}

impl ColumnComparator {
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            ColumnComparator::Bytes => a.cmp(b),
            ColumnComparator::TimeUuid => compare_time_uuids(a, b),
        }
    }

    /// Reject names this comparator cannot order meaningfully
    pub fn validate(&self, name: &[u8]) -> Result<()> {
        match self {
            ColumnComparator::Bytes => Ok(()),
            ColumnComparator::TimeUuid => TimeUuid::from_slice(name).map(|_| ()),
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            ColumnComparator::Bytes => 0,
            ColumnComparator::TimeUuid => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ColumnComparator::Bytes),
            1 => Ok(ColumnComparator::TimeUuid),
            other => Err(StoreError::Serialization(format!(
                "unknown comparator tag {}",
                other
            ))),
        }
    }
}
