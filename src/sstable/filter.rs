//! Bloom filter over row keys
//!
//! Bitset + k hashes derived from two crc32 values (double hashing).
//! Sized with m = -n·ln(p) / ln(2)², k = (m/n)·ln(2).

use serde::{Deserialize, Serialize};

use crate::codec::ByteReader;
use crate::error::{Result, StoreError};

use super::{read_component, write_component, Component, Descriptor, FILTER_MAGIC};

/// Seed for the second hash
const SECOND_HASH_SEED: u32 = 0xA5A5_A5A5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Create a filter for `expected_elements` keys at the given false-positive chance
    pub fn new(expected_elements: usize, fp_chance: f64) -> Self {
        let n = expected_elements.max(1) as f64;
        let num_bits = (-n * fp_chance.ln() / 2.0_f64.ln().powi(2)).ceil() as u64;
        let num_bits = num_bits.max(64);
        let num_words = num_bits.div_ceil(64) as usize;

        let num_hashes = ((num_bits as f64 / n) * 2.0_f64.ln()).ceil() as u32;

        Self {
            bits: vec![0; num_words],
            num_bits,
            num_hashes: num_hashes.clamp(1, 30),
        }
    }

    /// Build a filter holding every key
    pub fn from_keys<'a, I>(keys: I, count: usize, fp_chance: f64) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut filter = Self::new(count, fp_chance);
        for key in keys {
            filter.insert(key);
        }
        filter
    }

    pub fn insert(&mut self, key: &[u8]) {
        for bit in self.bit_positions(key) {
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    /// false = definitely absent
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.bit_positions(key)
            .all(|bit| self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0)
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    fn bit_positions(&self, key: &[u8]) -> impl Iterator<Item = u64> {
        let h1 = crc32fast::hash(key) as u64;
        let mut hasher = crc32fast::Hasher::new_with_initial(SECOND_HASH_SEED);
        hasher.update(key);
        let h2 = (hasher.finalize() as u64).max(1);
        let num_bits = self.num_bits;

        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % num_bits)
    }

    fn is_well_formed(&self) -> bool {
        self.num_hashes > 0
            && self.num_bits > 0
            && self.bits.len() as u64 == self.num_bits.div_ceil(64)
    }

    // =========================================================================
    // Component I/O
    // =========================================================================

    /// Persist as the FILTER component; payload: [DataLength: u64][bincode filter]
    pub(crate) fn write(&self, descriptor: &Descriptor, data_length: u64) -> Result<()> {
        let encoded = bincode::serialize(self)
            .map_err(|e| StoreError::Serialization(format!("bloom filter: {}", e)))?;
        let mut payload = Vec::with_capacity(8 + encoded.len());
        payload.extend_from_slice(&data_length.to_le_bytes());
        payload.extend_from_slice(&encoded);
        write_component(descriptor, Component::Filter, FILTER_MAGIC, &payload)
    }

    /// Load the FILTER component, rejecting one written for a different DATA length
    pub(crate) fn read(descriptor: &Descriptor, data_length: u64) -> Result<Self> {
        let payload = read_component(descriptor, Component::Filter, FILTER_MAGIC)?;
        let invalid = |reason: String| StoreError::InvalidComponent {
            path: descriptor.filename_for(Component::Filter),
            reason,
        };

        let mut reader = ByteReader::new(&payload);
        let recorded = reader.u64().map_err(|e| invalid(e.to_string()))?;
        if recorded != data_length {
            return Err(invalid(format!(
                "written for {} bytes of data, data is {} bytes",
                recorded, data_length
            )));
        }

        let filter: BloomFilter =
            bincode::deserialize(&payload[8..]).map_err(|e| invalid(e.to_string()))?;
        if !filter.is_well_formed() {
            return Err(invalid("malformed bit array".to_string()));
        }
        Ok(filter)
    }
}
