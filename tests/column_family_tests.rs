//! ColumnFamily and Serializer Tests
//!
//! Tests verify:
//! - Columns stay sorted by the table comparator
//! - Serialized bytes decode back to the same family
//! - Single-column lookup through the offset table
//! - Corrupted or truncated bytes are rejected

use cfstore::clock::ColumnClock;
use cfstore::db::serializer;
use cfstore::{Column, ColumnComparator, ColumnFamily, RowMutation, StoreError, TimeUuid};

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_family() -> ColumnFamily {
    let mut cf = ColumnFamily::new(ColumnComparator::Bytes);
    cf.add_column(Column::new("city", "Lisbon", 10i64)).unwrap();
    cf.add_column(Column::new("age", 33u32.to_be_bytes(), 10i64)).unwrap();
    cf.add_column(Column::tombstone("email", 12i64)).unwrap();
    cf.add_column(Column::new("name", "", 11i64)).unwrap();
    cf
}

// =============================================================================
// ColumnFamily Tests
// =============================================================================

#[test]
fn test_columns_sorted_by_name() {
    let cf = sample_family();
    let names: Vec<&[u8]> = cf.iter().map(|c| c.name()).collect();

    assert_eq!(names, vec![&b"age"[..], b"city", b"email", b"name"]);
}

#[test]
fn test_time_uuid_columns_sorted_by_time() {
    let first = TimeUuid::now();
    let second = TimeUuid::now();

    let mut cf = ColumnFamily::new(ColumnComparator::TimeUuid);
    cf.add_column(Column::new(second.as_bytes().to_vec(), "b", 1i64)).unwrap();
    cf.add_column(Column::new(first.as_bytes().to_vec(), "a", 1i64)).unwrap();

    assert_eq!(cf.columns()[0].name(), first.as_bytes());
    assert_eq!(cf.columns()[1].name(), second.as_bytes());
}

#[test]
fn test_time_uuid_family_rejects_invalid_name() {
    let mut cf = ColumnFamily::new(ColumnComparator::TimeUuid);
    let result = cf.add_column(Column::new("plain", "v", 1i64));

    assert!(matches!(result, Err(StoreError::Validation(_))));
    assert!(cf.is_empty());
}

#[test]
fn test_merge_reconciles_each_column() {
    let mut base = sample_family();

    let mut update = ColumnFamily::new(ColumnComparator::Bytes);
    update.add_column(Column::new("city", "Porto", 20i64)).unwrap();
    update.add_column(Column::new("email", "x@y", 5i64)).unwrap();
    update.add_column(Column::new("zip", "1000", 1i64)).unwrap();
    base.merge(&update).unwrap();

    assert_eq!(base.len(), 5);
    assert_eq!(base.get_column(b"city").unwrap().value(), b"Porto");
    // the older write does not resurrect the deleted column
    assert!(base.get_column(b"email").unwrap().is_tombstone());
    assert_eq!(base.get_column(b"zip").unwrap().value(), b"1000");
}

#[test]
fn test_row_mutation_add_and_delete() {
    let mut mutation = RowMutation::new("k1", ColumnComparator::Bytes);
    mutation.add("a", "1", 1i64).unwrap();
    mutation.delete("a", 2i64).unwrap();
    mutation.add("b", "2", 1i64).unwrap();

    assert_eq!(mutation.key(), b"k1");
    assert_eq!(mutation.columns().len(), 2);
    assert!(mutation.columns().get_column(b"a").unwrap().is_tombstone());
}

// =============================================================================
// Serializer Tests
// =============================================================================

#[test]
fn test_serialize_and_deserialize() {
    let cf = sample_family();
    let bytes = serializer::to_bytes(&cf).unwrap();

    let decoded = serializer::deserialize(&bytes).unwrap();
    assert_eq!(decoded, cf);
}

#[test]
fn test_serialize_appends_to_buffer() {
    let cf = sample_family();
    let mut out = b"prefix".to_vec();
    serializer::serialize_with_indexes(&cf, &mut out).unwrap();

    assert_eq!(&out[..6], b"prefix");
    assert_eq!(serializer::deserialize(&out[6..]).unwrap(), cf);
}

#[test]
fn test_serialize_time_uuid_clock() {
    let clock = TimeUuid::now();
    let mut cf = ColumnFamily::new(ColumnComparator::Bytes);
    cf.add_column(Column::new("c", "v", clock)).unwrap();

    let decoded = serializer::deserialize(&serializer::to_bytes(&cf).unwrap()).unwrap();
    assert_eq!(decoded.get_column(b"c").unwrap().clock(), &ColumnClock::from(clock));
}

#[test]
fn test_empty_family() {
    let cf = ColumnFamily::new(ColumnComparator::Bytes);
    let bytes = serializer::to_bytes(&cf).unwrap();

    assert!(serializer::deserialize(&bytes).unwrap().is_empty());
    assert_eq!(serializer::find_column(&bytes, b"any").unwrap(), None);
}

#[test]
fn test_find_column_through_offset_table() {
    let cf = sample_family();
    let bytes = serializer::to_bytes(&cf).unwrap();

    let city = serializer::find_column(&bytes, b"city").unwrap().unwrap();
    assert_eq!(city.value(), b"Lisbon");

    let email = serializer::find_column(&bytes, b"email").unwrap().unwrap();
    assert!(email.is_tombstone());

    assert_eq!(serializer::find_column(&bytes, b"missing").unwrap(), None);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_truncated_bytes_rejected() {
    let bytes = serializer::to_bytes(&sample_family()).unwrap();

    for len in [0, 1, 5, bytes.len() / 2, bytes.len() - 1] {
        let result = serializer::deserialize(&bytes[..len]);
        assert!(
            matches!(result, Err(StoreError::Serialization(_))),
            "accepted truncation to {} bytes",
            len
        );
    }
}

#[test]
fn test_trailing_bytes_rejected() {
    let mut bytes = serializer::to_bytes(&sample_family()).unwrap();
    bytes.push(0);

    assert!(serializer::deserialize(&bytes).is_err());
}

#[test]
fn test_unknown_comparator_rejected() {
    let mut bytes = serializer::to_bytes(&sample_family()).unwrap();
    bytes[0] = 9;

    assert!(matches!(
        serializer::deserialize(&bytes),
        Err(StoreError::Serialization(_))
    ));
}

#[test]
fn test_inconsistent_offset_rejected() {
    let mut cf = ColumnFamily::new(ColumnComparator::Bytes);
    cf.add_column(Column::new("a", "1", 1i64)).unwrap();
    cf.add_column(Column::new("b", "2", 1i64)).unwrap();
    let mut bytes = serializer::to_bytes(&cf).unwrap();

    // header(5) + entry "a"(2 + 1 + 4) + entry "b" len(2) + name(1) → offset of "b"
    let offset_pos = 5 + 7 + 3;
    bytes[offset_pos] += 1;

    assert!(serializer::deserialize(&bytes).is_err());
    assert!(serializer::find_column(&bytes, b"b").is_err());
}

#[test]
fn test_unsorted_offset_table_rejected() {
    let mut cf = ColumnFamily::new(ColumnComparator::Bytes);
    cf.add_column(Column::new("a", "1", 1i64)).unwrap();
    cf.add_column(Column::new("b", "2", 1i64)).unwrap();
    let mut bytes = serializer::to_bytes(&cf).unwrap();

    // swap the one-byte names in the offset table and in the block so every
    // offset still points at a column of the listed name
    let table_a = 5 + 2;
    let table_b = 5 + 7 + 2;
    // block starts after header(5) + two entries(7 each) + BlockLen(4);
    // each column is NameLen(2) + Name(1) + Flags(1) + Tag(1) + Clock(8) + ValLen(4) + Value(1)
    let block_a = 5 + 14 + 4 + 2;
    let block_b = block_a + 18;
    for (a, b) in [(table_a, table_b), (block_a, block_b)] {
        assert_eq!((bytes[a], bytes[b]), (b'a', b'b'));
        bytes.swap(a, b);
    }

    assert!(matches!(
        serializer::find_column(&bytes, b"b"),
        Err(StoreError::Serialization(_))
    ));
    assert!(serializer::deserialize(&bytes).is_err());
}
