//! Time-based (version 1) identifiers
//!
//! ```text
//! ┌──────────────┬────────────┬──────────────────┬────────────┬──────────┐
//! │ time_low (4) │ time_mid(2)│ ver|time_hi (2)  │ clk_seq(2) │ node (6) │
//! └──────────────┴────────────┴──────────────────┴────────────┴──────────┘
//! ```
//! The embedded timestamp is 60 bits of 100ns intervals since 1582-10-15.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, Relationship};
use crate::error::{Result, StoreError};

/// 100ns intervals between the Gregorian epoch and the Unix epoch
const GREGORIAN_OFFSET: u64 = 0x01B2_1DD2_1381_4000;

/// Mask for the 60-bit timestamp field
const TIMESTAMP_MASK: u64 = 0x0FFF_FFFF_FFFF_FFFF;

/// Last timestamp handed out by [`TimeUuid::now`]
static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Clock sequence and node, chosen once per process
static CLOCK_SEQ_AND_NODE: OnceLock<(u16, [u8; 6])> = OnceLock::new();

/// A 16-byte version 1 UUID, ordered by its embedded timestamp
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeUuid([u8; 16]);

impl TimeUuid {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parse and validate a 16-byte version 1 identifier
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 16] = bytes.try_into().map_err(|_| {
            StoreError::Validation(format!(
                "time uuid must be 16 bytes, got {}",
                bytes.len()
            ))
        })?;
        let uuid = Self(array);
        if uuid.version() != 1 {
            return Err(StoreError::Validation(format!(
                "expected version 1 uuid, got version {}",
                uuid.version()
            )));
        }
        Ok(uuid)
    }

    /// Assemble an identifier from its fields
    pub fn from_parts(timestamp: u64, clock_sequence: u16, node: [u8; 6]) -> Self {
        let timestamp = timestamp & TIMESTAMP_MASK;
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&(timestamp as u32).to_be_bytes());
        bytes[4..6].copy_from_slice(&((timestamp >> 32) as u16).to_be_bytes());
        let hi = ((timestamp >> 48) as u16 & 0x0FFF) | 0x1000;
        bytes[6..8].copy_from_slice(&hi.to_be_bytes());
        // RFC 4122 variant bits
        let seq = (clock_sequence & 0x3FFF) | 0x8000;
        bytes[8..10].copy_from_slice(&seq.to_be_bytes());
        bytes[10..16].copy_from_slice(&node);
        Self(bytes)
    }

    /// Generate a fresh identifier. Timestamps strictly increase within a process.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| (d.as_nanos() / 100) as u64)
            .unwrap_or(0);
        let candidate = since_epoch + GREGORIAN_OFFSET;

        let mut last = LAST_TIMESTAMP.load(AtomicOrdering::Acquire);
        let timestamp = loop {
            let next = candidate.max(last + 1);
            match LAST_TIMESTAMP.compare_exchange_weak(
                last,
                next,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            ) {
                Ok(_) => break next,
                Err(actual) => last = actual,
            }
        };

        let (clock_sequence, node) = *CLOCK_SEQ_AND_NODE.get_or_init(|| {
            let mut node: [u8; 6] = rand::random();
            // multicast bit marks a random (non-MAC) node
            node[0] |= 0x01;
            (rand::random(), node)
        });

        Self::from_parts(timestamp, clock_sequence, node)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn version(&self) -> u8 {
        self.0[6] >> 4
    }

    /// The embedded 60-bit timestamp
    pub fn timestamp(&self) -> u64 {
        timestamp_of(&self.0)
    }

    pub fn clock_sequence(&self) -> u16 {
        u16::from_be_bytes([self.0[8], self.0[9]]) & 0x3FFF
    }

    pub fn node(&self) -> [u8; 6] {
        let mut node = [0u8; 6];
        node.copy_from_slice(&self.0[10..16]);
        node
    }
}

fn timestamp_of(bytes: &[u8]) -> u64 {
    let low = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64;
    let mid = u16::from_be_bytes([bytes[4], bytes[5]]) as u64;
    let hi = (u16::from_be_bytes([bytes[6], bytes[7]]) & 0x0FFF) as u64;
    (hi << 48) | (mid << 32) | low
}

/// Time-ordered comparison of two serialized identifiers.
///
/// Empty values sort first. Two 16-byte values are ordered by embedded
/// timestamp, then by clock sequence and node, then by their raw bytes, so
/// distinct inputs never compare equal. Anything else falls back to byte
/// order.
pub fn compare_time_uuids(a: &[u8], b: &[u8]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    if a.len() != 16 || b.len() != 16 {
        return a.cmp(b);
    }

    timestamp_of(a)
        .cmp(&timestamp_of(b))
        .then_with(|| a[8..16].cmp(&b[8..16]))
        .then_with(|| a.cmp(b))
}

impl Ord for TimeUuid {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_time_uuids(&self.0, &other.0)
    }
}

impl PartialOrd for TimeUuid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Clock for TimeUuid {
    fn compare(&self, other: &Self) -> Relationship {
        self.cmp(other).into()
    }
}

impl fmt::Display for TimeUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TimeUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeUuid({})", self)
    }
}
