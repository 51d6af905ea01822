//! Clock Module
//!
//! Logical clocks attached to columns, used to order conflicting writes.
//!
//! ## Relationship
//! Comparing two clocks yields a [`Relationship`]. Timestamp clocks only ever
//! produce `Equal`, `GreaterThan` or `LessThan`; `Disjoint` is what an
//! incomparable pair produces (e.g. clocks of different kinds) and is
//! rejected by reconciliation.

mod reconciler;

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::marshal::TimeUuid;

pub use reconciler::reconcile;

/// Outcome of comparing two clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relationship {
    Equal,
    GreaterThan,
    LessThan,
    /// Neither clock dominates; cannot be resolved by reconciliation
    Disjoint,
}

impl From<Ordering> for Relationship {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Equal => Relationship::Equal,
            Ordering::Greater => Relationship::GreaterThan,
            Ordering::Less => Relationship::LessThan,
        }
    }
}

/// A comparable logical timestamp
pub trait Clock {
    fn compare(&self, other: &Self) -> Relationship;
}

/// Monotonic integer timestamp clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimestampClock(i64);

impl TimestampClock {
    pub const fn new(timestamp: i64) -> Self {
        Self(timestamp)
    }

    /// Microseconds since the Unix epoch
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Self(micros)
    }

    pub fn timestamp(&self) -> i64 {
        self.0
    }
}

impl Clock for TimestampClock {
    fn compare(&self, other: &Self) -> Relationship {
        self.0.cmp(&other.0).into()
    }
}

/// The clock stored on a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnClock {
    Timestamp(TimestampClock),
    TimeUuid(TimeUuid),
}

impl ColumnClock {
    /// Serialized tag for the timestamp kind
    pub(crate) const TIMESTAMP_TAG: u8 = 0;
    /// Serialized tag for the time-uuid kind
    pub(crate) const TIME_UUID_TAG: u8 = 1;

    pub fn timestamp(timestamp: i64) -> Self {
        ColumnClock::Timestamp(TimestampClock::new(timestamp))
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            ColumnClock::Timestamp(_) => Self::TIMESTAMP_TAG,
            ColumnClock::TimeUuid(_) => Self::TIME_UUID_TAG,
        }
    }

    /// Encoded size in bytes, excluding the tag
    pub(crate) fn encoded_len(&self) -> usize {
        match self {
            ColumnClock::Timestamp(_) => 8,
            ColumnClock::TimeUuid(_) => 16,
        }
    }
}

impl From<TimestampClock> for ColumnClock {
    fn from(clock: TimestampClock) -> Self {
        ColumnClock::Timestamp(clock)
    }
}

impl From<i64> for ColumnClock {
    fn from(timestamp: i64) -> Self {
        ColumnClock::timestamp(timestamp)
    }
}

impl From<TimeUuid> for ColumnClock {
    fn from(clock: TimeUuid) -> Self {
        ColumnClock::TimeUuid(clock)
    }
}

impl Clock for ColumnClock {
    fn compare(&self, other: &Self) -> Relationship {
        match (self, other) {
            (ColumnClock::Timestamp(a), ColumnClock::Timestamp(b)) => a.compare(b),
            (ColumnClock::TimeUuid(a), ColumnClock::TimeUuid(b)) => a.compare(b),
            _ => Relationship::Disjoint,
        }
    }
}
