//! Compaction Module
//!
//! Background work against SSTables. Today that is rebuilding the derived
//! components of a generation from its DATA component.

mod executor;

pub use executor::{CompactionExecutor, JobHandle, JobResult, RebuildHandle, RebuildResult};
