//! MemTable Module
//!
//! In-memory rows that have not been flushed to an SSTable yet.
//!
//! ## Responsibilities
//! - Reconcile incoming columns against what the row already holds
//! - Track approximate size for flush triggers
//! - Ordered snapshot in partitioner order for SSTable creation
//! - Candidate lookup for secondary index scans
//!
//! ## Data Structure Choice
//! BTreeMap keyed by `DecoratedKey` behind a RwLock: rows come out in the
//! order an SSTable needs them.

mod table;

pub use table::Memtable;
