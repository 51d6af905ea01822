//! DHT Module
//!
//! Maps row keys onto an ordered token space and describes token ranges.
//!
//! ## Ring
//! Tokens are byte strings compared lexicographically. The empty token is
//! the minimum and doubles as the "unbounded" sentinel: a range from the
//! minimum token to itself covers the whole ring.

mod range;

use std::cmp::Ordering;
use std::fmt;

pub use range::Range;

/// A position on the ring
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(Vec<u8>);

impl Token {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The minimum token sentinel
    pub fn minimum() -> Self {
        Self(Vec::new())
    }

    pub fn is_minimum(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A row key paired with its token; ordered by token, then key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecoratedKey {
    token: Token,
    key: Vec<u8>,
}

impl DecoratedKey {
    pub fn new(token: Token, key: impl Into<Vec<u8>>) -> Self {
        Self {
            token,
            key: key.into(),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl Ord for DecoratedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.token
            .cmp(&other.token)
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for DecoratedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DecoratedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.key))
    }
}

/// Assigns tokens to keys
pub trait Partitioner: Send + Sync + fmt::Debug {
    fn token(&self, key: &[u8]) -> Token;

    fn name(&self) -> &'static str;

    fn minimum_token(&self) -> Token {
        Token::minimum()
    }

    fn decorate(&self, key: &[u8]) -> DecoratedKey {
        DecoratedKey::new(self.token(key), key)
    }
}

/// Token is the key itself, so rows sort in raw key order
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteOrderedPartitioner;

impl Partitioner for ByteOrderedPartitioner {
    fn token(&self, key: &[u8]) -> Token {
        Token::new(key)
    }

    fn name(&self) -> &'static str {
        "ByteOrderedPartitioner"
    }
}

/// Token is the big-endian crc32 of the key, spreading keys over the ring
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPartitioner;

impl Partitioner for HashPartitioner {
    fn token(&self, key: &[u8]) -> Token {
        Token::new(crc32fast::hash(key).to_be_bytes().to_vec())
    }

    fn name(&self) -> &'static str {
        "HashPartitioner"
    }
}
