//! Reconciler Tests
//!
//! Tests verify:
//! - Higher clock wins regardless of tombstones
//! - Tombstones win at equal clocks
//! - Larger value wins at equal clocks
//! - The winner is one of the inputs (identity preserved)
//! - Incomparable clocks are rejected

use cfstore::clock::{Clock, ColumnClock, Relationship, TimestampClock};
use cfstore::{reconcile, Column, ColumnComparator, ColumnFamily, StoreError, TimeUuid};

// =============================================================================
// Helper Functions
// =============================================================================

fn live(value: &str, ts: i64) -> Column {
    Column::new("name", value, ts)
}

fn dead(ts: i64) -> Column {
    Column::tombstone("name", ts)
}

// =============================================================================
// Clock Ordering Tests
// =============================================================================

#[test]
fn test_timestamp_clock_relationships() {
    let a = TimestampClock::new(3);
    let b = TimestampClock::new(5);

    assert_eq!(a.compare(&b), Relationship::LessThan);
    assert_eq!(b.compare(&a), Relationship::GreaterThan);
    assert_eq!(a.compare(&TimestampClock::new(3)), Relationship::Equal);
}

#[test]
fn test_mixed_clock_kinds_are_disjoint() {
    let ts = ColumnClock::timestamp(1);
    let uuid = ColumnClock::from(TimeUuid::now());

    assert_eq!(ts.compare(&uuid), Relationship::Disjoint);
    assert_eq!(uuid.compare(&ts), Relationship::Disjoint);
}

// =============================================================================
// Reconcile Tests
// =============================================================================

#[test]
fn test_higher_clock_wins_returns_same_instance() {
    let left = live("a", 5);
    let right = live("b", 3);

    let winner = reconcile(&left, &right).unwrap();
    assert!(std::ptr::eq(winner, &left));

    let winner = reconcile(&right, &left).unwrap();
    assert!(std::ptr::eq(winner, &left));
}

#[test]
fn test_higher_clock_beats_tombstone_and_vice_versa() {
    let newer_value = live("v", 10);
    let older_delete = dead(9);
    assert!(std::ptr::eq(
        reconcile(&older_delete, &newer_value).unwrap(),
        &newer_value
    ));

    let newer_delete = dead(11);
    assert!(std::ptr::eq(
        reconcile(&newer_value, &newer_delete).unwrap(),
        &newer_delete
    ));
}

#[test]
fn test_tombstone_wins_at_equal_clock() {
    let value = live("zzz", 7);
    let delete = dead(7);

    assert!(std::ptr::eq(reconcile(&value, &delete).unwrap(), &delete));
    assert!(std::ptr::eq(reconcile(&delete, &value).unwrap(), &delete));
}

#[test]
fn test_two_tombstones_at_equal_clock_pick_left() {
    let first = dead(4);
    let second = dead(4);

    assert!(std::ptr::eq(reconcile(&first, &second).unwrap(), &first));
}

#[test]
fn test_larger_value_wins_at_equal_clock() {
    let small = live("a", 1);
    let large = live("b", 1);

    assert!(std::ptr::eq(reconcile(&small, &large).unwrap(), &large));
    assert!(std::ptr::eq(reconcile(&large, &small).unwrap(), &large));
}

#[test]
fn test_identical_columns_return_left() {
    let left = live("same", 2);
    let right = live("same", 2);

    assert!(std::ptr::eq(reconcile(&left, &right).unwrap(), &left));
}

#[test]
fn test_reconcile_is_order_independent_in_value() {
    let cases = [
        (live("a", 1), live("b", 2)),
        (live("x", 4), dead(4)),
        (dead(8), live("y", 3)),
        (live("m", 6), live("n", 6)),
    ];

    for (a, b) in &cases {
        let ab = reconcile(a, b).unwrap();
        let ba = reconcile(b, a).unwrap();
        assert_eq!(ab, ba);
    }
}

#[test]
fn test_disjoint_clocks_error() {
    let left = Column::new("name", "a", 1i64);
    let right = Column::new("name", "b", TimeUuid::now());

    let result = reconcile(&left, &right);
    assert!(matches!(
        result,
        Err(StoreError::InvalidClockRelationship(Relationship::Disjoint))
    ));
}

// =============================================================================
// ColumnFamily Reconciliation Tests
// =============================================================================

#[test]
fn test_column_family_keeps_reconciled_winner() {
    let mut cf = ColumnFamily::new(ColumnComparator::Bytes);
    cf.add_column(Column::new("c", "old", 1i64)).unwrap();
    cf.add_column(Column::new("c", "new", 2i64)).unwrap();
    cf.add_column(Column::new("c", "stale", 0i64)).unwrap();

    assert_eq!(cf.len(), 1);
    assert_eq!(cf.get_column(b"c").unwrap().value(), b"new");
}

#[test]
fn test_column_family_disjoint_leaves_existing_column() {
    let mut cf = ColumnFamily::new(ColumnComparator::Bytes);
    cf.add_column(Column::new("c", "v", 1i64)).unwrap();

    let result = cf.add_column(Column::new("c", "w", TimeUuid::now()));
    assert!(result.is_err());
    assert_eq!(cf.get_column(b"c").unwrap().value(), b"v");
}
