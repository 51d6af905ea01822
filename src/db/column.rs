//! Column: a named, versioned, possibly-deleted cell

use crate::clock::ColumnClock;

/// A single versioned cell. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: Vec<u8>,
    value: Vec<u8>,
    clock: ColumnClock,
    tombstone: bool,
}

impl Column {
    /// A live column
    pub fn new(
        name: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        clock: impl Into<ColumnClock>,
    ) -> Self {
        Self::from_parts(name, value, clock, false)
    }

    /// A deletion marker for `name`
    pub fn tombstone(name: impl Into<Vec<u8>>, clock: impl Into<ColumnClock>) -> Self {
        Self::from_parts(name, Vec::new(), clock, true)
    }

    pub fn from_parts(
        name: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        clock: impl Into<ColumnClock>,
        tombstone: bool,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            clock: clock.into(),
            tombstone,
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn clock(&self) -> &ColumnClock {
        &self.clock
    }

    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    /// Approximate in-memory footprint (name + value + clock)
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + self.clock.encoded_len()
    }
}
