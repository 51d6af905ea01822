//! Column reconciliation
//!
//! Picks the surviving version of a cell. Higher clock wins outright,
//! regardless of delete status. At equal clocks a tombstone wins, and below
//! that the larger value (byte order) wins. Byte-identical inputs return
//! `left`.

use crate::db::Column;
use crate::error::{Result, StoreError};

use super::{Clock, Relationship};

/// Reconcile two versions of the same column, returning the winner.
///
/// Both arguments must carry the same name. The returned reference is one of
/// the two inputs; neither is modified.
pub fn reconcile<'a>(left: &'a Column, right: &'a Column) -> Result<&'a Column> {
    debug_assert_eq!(left.name(), right.name(), "reconciling different cells");

    match left.clock().compare(right.clock()) {
        Relationship::GreaterThan => Ok(left),
        Relationship::LessThan => Ok(right),
        Relationship::Equal => {
            // tombstones take precedence; two tombstones are interchangeable
            if left.is_tombstone() {
                return Ok(left);
            }
            if right.is_tombstone() {
                return Ok(right);
            }
            if left.value() < right.value() {
                Ok(right)
            } else {
                Ok(left)
            }
        }
        relationship @ Relationship::Disjoint => {
            Err(StoreError::InvalidClockRelationship(relationship))
        }
    }
}
