//! Column Family Store Tests
//!
//! Tests verify:
//! - Recovering a generation in the background, registering it and
//!   answering an index scan over memtable and sstable rows
//! - Flush, reopen and generation discovery
//! - Reconciled reads across memtable and sstables
//! - Scan predicates, paging, token ranges and query filters

use std::fs;
use std::sync::Arc;

use cfstore::compaction::CompactionExecutor;
use cfstore::db::serializer;
use cfstore::dht::{Range, Token};
use cfstore::sstable::{write_raw_sstable, Component, Descriptor, SSTableWriter};
use cfstore::{
    Column, ColumnComparator, ColumnFamily, ColumnFamilyStore, Config, IndexClause,
    IndexExpression, IndexOperator, QueryFilter, RowMutation, StorageContext, StoreError,
    TableMetadata,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn context(temp: &TempDir) -> Arc<StorageContext> {
    let config = Config::builder().data_dir(temp.path()).build();
    StorageContext::new(config).unwrap()
}

fn metadata() -> TableMetadata {
    TableMetadata::new("Keyspace1", "Indexed1")
        .unwrap()
        .with_indexed_column("birthdate")
}

fn open_store(temp: &TempDir) -> ColumnFamilyStore {
    ColumnFamilyStore::open(context(temp), metadata()).unwrap()
}

fn long(v: i64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

fn mutation(key: &str, columns: &[(&str, Vec<u8>, i64)]) -> RowMutation {
    let mut rm = RowMutation::new(key, ColumnComparator::Bytes);
    for (name, value, ts) in columns {
        rm.add(*name, value.clone(), *ts).unwrap();
    }
    rm
}

fn raw_row(columns: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut cf = ColumnFamily::new(ColumnComparator::Bytes);
    for (name, value) in columns {
        cf.add_column(Column::new(*name, value.clone(), 0i64)).unwrap();
    }
    serializer::to_bytes(&cf).unwrap()
}

fn birthdate_is(v: i64) -> IndexClause {
    IndexClause::new(
        vec![IndexExpression::new("birthdate", IndexOperator::Eq, long(v))],
        "",
        100,
    )
}

fn index_all(store: &ColumnFamilyStore) {
    store
        .build_secondary_indexes(&store.sstables(), &store.indexed_columns())
        .unwrap();
}

fn keys(rows: &[cfstore::Row]) -> Vec<Vec<u8>> {
    rows.iter().map(|r| r.key.key().to_vec()).collect()
}

// =============================================================================
// Recovery + Index Scan
// =============================================================================

#[test]
fn test_recover_and_open() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let ctx = Arc::clone(store.context());

    store
        .apply(&mutation("k1", &[("birthdate", long(1), 0)]))
        .unwrap();

    let desc = store.next_descriptor().unwrap();
    let entries = vec![
        (
            b"k2".to_vec(),
            raw_row(&[("birthdate", long(1)), ("anydate", long(1))]),
        ),
        (b"k3".to_vec(), raw_row(&[("anydate", long(1))])),
    ];
    write_raw_sstable(&desc, &ctx, entries).unwrap();

    fs::remove_file(desc.filename_for(Component::PrimaryIndex)).unwrap();
    fs::remove_file(desc.filename_for(Component::Filter)).unwrap();

    let executor = CompactionExecutor::new(Arc::clone(&ctx)).unwrap();
    let reader = executor.submit_rebuild(&desc).wait().unwrap();
    store.add_sstable(reader);
    index_all(&store);

    let rows = store
        .scan(&birthdate_is(1), &ctx.full_range(), &QueryFilter::Identity)
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key.key(), b"k1");
    assert_eq!(rows[1].key.key(), b"k2");
    assert_eq!(
        rows[1].columns.get_column(b"anydate").unwrap().value(),
        long(1).as_slice()
    );
}

#[test]
fn test_scan_without_index_fails() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let full = store.context().full_range();

    store
        .apply(&mutation("k1", &[("birthdate", long(1), 0)]))
        .unwrap();

    let err = store
        .scan(&birthdate_is(1), &full, &QueryFilter::Identity)
        .unwrap_err();
    assert!(matches!(err, StoreError::IndexNotBuilt(_)));

    index_all(&store);
    // a clause with no Eq over an indexed column still cannot use the index
    let clause = IndexClause::new(
        vec![IndexExpression::new("birthdate", IndexOperator::Gt, long(0))],
        "",
        10,
    );
    assert!(matches!(
        store.scan(&clause, &full, &QueryFilter::Identity),
        Err(StoreError::IndexNotBuilt(_))
    ));
}

#[test]
fn test_scan_rechecks_reconciled_row() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let full = store.context().full_range();

    store
        .apply(&mutation("a", &[("birthdate", long(1), 1)]))
        .unwrap();
    store
        .apply(&mutation("b", &[("birthdate", long(1), 1)]))
        .unwrap();
    store.flush().unwrap();
    index_all(&store);

    // newer writes move "a" away from the value and delete it on "b"
    store
        .apply(&mutation("a", &[("birthdate", long(2), 2)]))
        .unwrap();
    let mut rm = RowMutation::new("b", ColumnComparator::Bytes);
    rm.delete("birthdate", 2i64).unwrap();
    store.apply(&rm).unwrap();

    let rows = store
        .scan(&birthdate_is(1), &full, &QueryFilter::Identity)
        .unwrap();
    assert!(rows.is_empty());

    let rows = store
        .scan(&birthdate_is(2), &full, &QueryFilter::Identity)
        .unwrap();
    assert_eq!(keys(&rows), vec![b"a".to_vec()]);
}

#[test]
fn test_scan_secondary_expressions_and_paging() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let full = store.context().full_range();

    for (i, k) in ["r1", "r2", "r3", "r4"].iter().enumerate() {
        store
            .apply(&mutation(k, &[("birthdate", long(7), 1), ("age", vec![i as u8], 1)]))
            .unwrap();
    }
    store.flush().unwrap();
    index_all(&store);

    let clause = IndexClause::new(
        vec![
            IndexExpression::new("birthdate", IndexOperator::Eq, long(7)),
            IndexExpression::new("age", IndexOperator::Gte, vec![1u8]),
        ],
        "",
        100,
    );
    let rows = store.scan(&clause, &full, &QueryFilter::Identity).unwrap();
    assert_eq!(keys(&rows), vec![b"r2".to_vec(), b"r3".to_vec(), b"r4".to_vec()]);

    let paged = IndexClause::new(clause.expressions.clone(), "r3", 1);
    let rows = store.scan(&paged, &full, &QueryFilter::Identity).unwrap();
    assert_eq!(keys(&rows), vec![b"r3".to_vec()]);

    let lt = IndexClause::new(
        vec![
            IndexExpression::new("birthdate", IndexOperator::Eq, long(7)),
            IndexExpression::new("age", IndexOperator::Lt, vec![1u8]),
        ],
        "",
        100,
    );
    let rows = store.scan(&lt, &full, &QueryFilter::Identity).unwrap();
    assert_eq!(keys(&rows), vec![b"r1".to_vec()]);
}

#[test]
fn test_scan_respects_token_range() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    for k in ["a", "b", "c", "d"] {
        store
            .apply(&mutation(k, &[("birthdate", long(1), 1)]))
            .unwrap();
    }
    index_all(&store);

    let range = Range::new(Token::new(b"a".to_vec()), Token::new(b"c".to_vec()));
    let rows = store
        .scan(&birthdate_is(1), &range, &QueryFilter::Identity)
        .unwrap();
    assert_eq!(keys(&rows), vec![b"b".to_vec(), b"c".to_vec()]);

    let wrapping = Range::new(Token::new(b"c".to_vec()), Token::new(b"a".to_vec()));
    let rows = store
        .scan(&birthdate_is(1), &wrapping, &QueryFilter::Identity)
        .unwrap();
    assert_eq!(keys(&rows), vec![b"a".to_vec(), b"d".to_vec()]);
}

#[test]
fn test_flushed_rows_stay_discoverable() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let full = store.context().full_range();
    index_all(&store);

    store
        .apply(&mutation("late", &[("birthdate", long(5), 1)]))
        .unwrap();
    store.flush().unwrap();
    assert_eq!(store.memtable_row_count(), 0);

    let rows = store
        .scan(&birthdate_is(5), &full, &QueryFilter::Identity)
        .unwrap();
    assert_eq!(keys(&rows), vec![b"late".to_vec()]);
}

// =============================================================================
// Query Filter Tests
// =============================================================================

#[test]
fn test_query_filters() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let full = store.context().full_range();

    store
        .apply(&mutation(
            "k",
            &[
                ("a", b"1".to_vec(), 1),
                ("b", b"2".to_vec(), 1),
                ("birthdate", long(1), 1),
                ("c", b"3".to_vec(), 1),
            ],
        ))
        .unwrap();
    index_all(&store);

    let names = QueryFilter::names(["a", "c"]);
    let rows = store.scan(&birthdate_is(1), &full, &names).unwrap();
    let selected: Vec<&[u8]> = rows[0].columns.iter().map(|c| c.name()).collect();
    assert_eq!(selected, vec![&b"a"[..], b"c"]);

    let slice = QueryFilter::Slice {
        start: b"b".to_vec(),
        finish: Vec::new(),
        count: 2,
    };
    let row = store.get_row(b"k", &slice).unwrap().unwrap();
    let selected: Vec<&[u8]> = row.columns.iter().map(|c| c.name()).collect();
    assert_eq!(selected, vec![&b"b"[..], b"birthdate"]);
}

// =============================================================================
// Flush / Reopen Tests
// =============================================================================

#[test]
fn test_flush_and_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let store = open_store(&temp);
        store
            .apply(&mutation("k1", &[("name", b"one".to_vec(), 1)]))
            .unwrap();
        let reader = store.flush().unwrap().unwrap();
        assert_eq!(reader.descriptor().generation(), 1);
        assert!(store.flush().unwrap().is_none());

        store
            .apply(&mutation("k2", &[("name", b"two".to_vec(), 1)]))
            .unwrap();
        store.flush().unwrap();
        assert_eq!(store.sstable_count(), 2);
    }

    let store = open_store(&temp);
    assert_eq!(store.sstable_count(), 2);
    assert_eq!(store.next_descriptor().unwrap().generation(), 3);

    let row = store.get_row(b"k2", &QueryFilter::Identity).unwrap().unwrap();
    assert_eq!(row.columns.get_column(b"name").unwrap().value(), b"two");
}

#[test]
fn test_reopen_rebuilds_missing_components_and_skips_corrupt_data() {
    let temp = TempDir::new().unwrap();
    {
        let store = open_store(&temp);
        for (k, gen_value) in [("k1", "a"), ("k2", "b")] {
            store
                .apply(&mutation(k, &[("v", gen_value.as_bytes().to_vec(), 1)]))
                .unwrap();
            store.flush().unwrap();
        }
    }

    let dir = temp.path().join("Keyspace1");
    let first = Descriptor::new(&dir, "Keyspace1", "Indexed1", 1).unwrap();
    let second = first.with_generation(2);
    fs::remove_file(first.filename_for(Component::PrimaryIndex)).unwrap();
    fs::write(second.filename_for(Component::Data), b"garbage").unwrap();

    let store = open_store(&temp);
    assert_eq!(store.sstable_count(), 1);
    assert!(first.exists(Component::PrimaryIndex));
    assert!(store.get_row(b"k1", &QueryFilter::Identity).unwrap().is_some());
    // generation numbers are never reused
    assert_eq!(store.next_descriptor().unwrap().generation(), 3);
}

#[test]
fn test_reopen_ignores_failed_write() {
    let temp = TempDir::new().unwrap();
    {
        let store = open_store(&temp);
        let ctx = Arc::clone(store.context());
        let desc = store.next_descriptor().unwrap();
        let entries = vec![
            (b"a".to_vec(), raw_row(&[("birthdate", long(1))])),
            (b"b".to_vec(), vec![9, 9, 9]),
        ];
        assert!(write_raw_sstable(&desc, &ctx, entries).is_err());
    }

    let store = open_store(&temp);
    assert_eq!(store.sstable_count(), 0);
    assert!(store.get_row(b"a", &QueryFilter::Identity).unwrap().is_none());
}

#[test]
fn test_failed_automatic_flush_keeps_rows() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .memtable_size_limit(1)
        .build();
    let store = ColumnFamilyStore::open(StorageContext::new(config).unwrap(), metadata()).unwrap();

    // occupy the generation the next flush will claim
    let blocked = Descriptor::new(store.directory(), "Keyspace1", "Indexed1", 1).unwrap();
    fs::write(blocked.filename_for(Component::Data), b"taken").unwrap();

    store
        .apply(&mutation("k1", &[("birthdate", long(1), 1)]))
        .unwrap();
    assert_eq!(store.sstable_count(), 0);
    assert!(store.memtable_size() > 0);
    assert!(store.get_row(b"k1", &QueryFilter::Identity).unwrap().is_some());

    // the next flush moves on to a fresh generation
    let reader = store.flush().unwrap().unwrap();
    assert_eq!(reader.descriptor().generation(), 2);
    assert_eq!(store.memtable_size(), 0);
    assert!(store.get_row(b"k1", &QueryFilter::Identity).unwrap().is_some());
}

#[test]
fn test_memtable_flushes_at_size_limit() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .memtable_size_limit(256)
        .build();
    let store = ColumnFamilyStore::open(StorageContext::new(config).unwrap(), metadata()).unwrap();

    for i in 0..20 {
        store
            .apply(&mutation(&format!("key{:02}", i), &[("payload", vec![0u8; 64], 1)]))
            .unwrap();
    }

    assert!(store.sstable_count() > 0);
    assert!(store.memtable_size() < 256);
    for i in 0..20 {
        let key = format!("key{:02}", i);
        assert!(store.get_row(key.as_bytes(), &QueryFilter::Identity).unwrap().is_some());
    }
}

// =============================================================================
// Reconciled Read Tests
// =============================================================================

#[test]
fn test_reads_reconcile_memtable_and_sstables() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    store
        .apply(&mutation("k", &[("a", b"old".to_vec(), 1), ("b", b"keep".to_vec(), 1)]))
        .unwrap();
    store.flush().unwrap();
    store
        .apply(&mutation("k", &[("a", b"new".to_vec(), 5)]))
        .unwrap();
    store.flush().unwrap();
    store
        .apply(&mutation("k", &[("a", b"stale".to_vec(), 3)]))
        .unwrap();

    let a = store.get_column(b"k", b"a").unwrap().unwrap();
    assert_eq!(a.value(), b"new");

    let row = store.get_row(b"k", &QueryFilter::Identity).unwrap().unwrap();
    assert_eq!(row.columns.len(), 2);
    assert_eq!(row.columns.get_column(b"b").unwrap().value(), b"keep");

    assert!(store.get_row(b"absent", &QueryFilter::Identity).unwrap().is_none());
    assert!(store.get_column(b"k", b"absent").unwrap().is_none());
}

#[test]
fn test_add_sstable_written_outside_the_store() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let ctx = Arc::clone(store.context());

    let desc = Descriptor::new(store.directory(), "Keyspace1", "Indexed1", 10).unwrap();
    let mut writer = SSTableWriter::create(&desc, &ctx).unwrap();
    let mut cf = ColumnFamily::new(ColumnComparator::Bytes);
    cf.add_column(Column::new("birthdate", long(3), 1i64)).unwrap();
    writer.append(b"ext", &cf).unwrap();
    let reader = Arc::new(writer.finish().unwrap());

    store.add_sstable(Arc::clone(&reader));
    store.add_sstable(reader);
    assert_eq!(store.sstable_count(), 1);
    assert_eq!(store.next_descriptor().unwrap().generation(), 11);

    index_all(&store);
    let rows = store
        .scan(&birthdate_is(3), &ctx.full_range(), &QueryFilter::Identity)
        .unwrap();
    assert_eq!(keys(&rows), vec![b"ext".to_vec()]);
}
