//! # cfstore
//!
//! Storage core of a column-family database:
//! - Per-cell reconciliation of versions written under logical clocks
//! - Immutable sorted table files (SSTables) with rebuildable index,
//!   bloom filter and statistics components
//! - Background rebuild jobs recovering a table from its data component
//! - Secondary indexes and predicate + token range scans
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ColumnFamilyStore                         │
//! │         (apply / flush / get_row / scan / add_sstable)       │
//! └───────┬─────────────────────┬───────────────────────┬───────┘
//!         │                     │                       │
//!         ▼                     ▼                       ▼
//!  ┌─────────────┐      ┌───────────────┐      ┌─────────────────┐
//!  │  Memtable   │      │ SSTableReader │      │ SecondaryIndex  │
//!  │  (RwLock)   │      │  (Arc, many)  │      │   (snapshot)    │
//!  └──────┬──────┘      └───────▲───────┘      └─────────────────┘
//!         │ flush               │ open / rebuild
//!         ▼                     │
//!  ┌─────────────┐      ┌───────┴──────────┐
//!  │SSTableWriter│─────▶│ Data + Index +   │◀── CompactionExecutor
//!  └─────────────┘      │ Filter + Stats   │    (rebuild workers)
//!                       └──────────────────┘
//! ```
//!
//! Every column write goes through [`clock::reconcile`], both in the
//! memtable and when versions from several SSTables are merged on read.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod context;

pub mod clock;
pub mod marshal;
pub mod db;
pub mod dht;
pub mod sstable;
pub mod compaction;
pub mod memtable;
pub mod store;

mod codec;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{Config, PartitionerKind};
pub use context::StorageContext;
pub use clock::{reconcile, ColumnClock, Relationship, TimestampClock};
pub use marshal::{ColumnComparator, TimeUuid};
pub use db::{Column, ColumnFamily, Row, RowMutation};
pub use sstable::{Component, Descriptor, SSTableReader, SSTableWriter};
pub use compaction::CompactionExecutor;
pub use store::{
    ColumnFamilyStore, IndexClause, IndexExpression, IndexOperator, QueryFilter, TableMetadata,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of cfstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
