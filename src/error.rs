//! Error types for cfstore
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::clock::Relationship;
use crate::sstable::Component;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for cfstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Reconciliation Errors
    // -------------------------------------------------------------------------
    /// A clock produced a relationship that reconciliation cannot order.
    /// Indicates a broken clock implementation; never retried.
    #[error("Clocks must be equal, greater than or less than, got {0:?}")]
    InvalidClockRelationship(Relationship),

    // -------------------------------------------------------------------------
    // SSTable Errors
    // -------------------------------------------------------------------------
    #[error("Data component missing: {0}")]
    MissingDataComponent(PathBuf),

    #[error("Corrupt data component {path} at offset {offset}: {reason}")]
    CorruptDataComponent {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    #[error("{component:?} component missing: {path}")]
    MissingComponent { component: Component, path: PathBuf },

    #[error("Invalid component {path}: {reason}")]
    InvalidComponent { path: PathBuf, reason: String },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Rebuild error: {0}")]
    Rebuild(String),

    // -------------------------------------------------------------------------
    // Query Errors
    // -------------------------------------------------------------------------
    #[error("No secondary index covers column {0}")]
    IndexNotBuilt(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether this error means an auxiliary component can be rebuilt from DATA.
    pub fn is_recoverable_component(&self) -> bool {
        matches!(
            self,
            StoreError::MissingComponent { .. } | StoreError::InvalidComponent { .. }
        )
    }
}
