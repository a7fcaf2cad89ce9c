//! `approximate_offset_of` bounds and monotonicity.

mod common;

use std::sync::Arc;

use rand::Rng;
use tablestore::env::InMemoryFile;
use tablestore::memtable::internal_key::{lookup_key, InternalKey, InternalKeyComparator, ValueType};
use tablestore::{
    BlockBasedTable, BlockBasedTableBuilder, BlockBasedTableOptions, CompressionType, Options, PlainTableBuilder,
    PlainTableOptions, PlainTableReader,
};

const ENTRIES: [(&str, usize); 7] = [
    ("k01", 5),
    ("k02", 6),
    ("k03", 10000),
    ("k04", 200000),
    ("k05", 300000),
    ("k06", 6),
    ("k07", 100000),
];

fn values(seed: u64) -> Vec<Vec<u8>> {
    let mut rng = common::rng(seed);
    ENTRIES.iter().map(|&(_, len)| (0..len).map(|_| rng.random::<u8>()).collect()).collect()
}

fn between(value: u64, low: u64, high: u64) {
    assert!(value >= low && value <= high, "{} not in [{}, {}]", value, low, high);
}

fn check_monotonic(offsets: &[u64]) {
    for pair in offsets.windows(2) {
        assert!(pair[0] <= pair[1], "offsets not monotonic: {:?}", offsets);
    }
}

fn block_based_table(compression: CompressionType) -> BlockBasedTable {
    let options = Options::default().compression(compression);
    let table_options = BlockBasedTableOptions::default().block_size(1024);
    let mut builder = BlockBasedTableBuilder::new(options.clone(), table_options.clone(), Vec::new()).unwrap();
    for ((key, _), value) in ENTRIES.iter().zip(values(17)) {
        builder.add(key.as_bytes(), &value).unwrap();
    }
    builder.finish().unwrap();
    BlockBasedTable::open(options, table_options, Arc::new(InMemoryFile::new(builder.into_inner()))).unwrap()
}

#[test]
fn test_block_based_offsets() {
    common::init_logger();
    for compression in common::compressions() {
        let table = block_based_table(compression);
        let offset = |key: &str| table.approximate_offset_of(key.as_bytes());

        between(offset("abc"), 0, 0);
        between(offset("k01"), 0, 0);
        between(offset("k01a"), 0, 0);
        between(offset("k02"), 0, 0);
        between(offset("k03"), 0, 0);
        between(offset("k04"), 10000, 11000);
        between(offset("k04a"), 210000, 211000);
        between(offset("k05"), 210000, 211000);
        between(offset("k06"), 510000, 511000);
        between(offset("k07"), 510000, 511000);
        between(offset("xyz"), 610000, 612000);

        let keys = ["abc", "k01", "k02", "k03", "k04", "k05", "k06", "k07", "xyz"];
        check_monotonic(&keys.iter().map(|k| offset(k)).collect::<Vec<_>>());
    }
}

#[test]
fn test_plain_total_order_offsets() {
    let options = Options::default().comparator(Arc::new(InternalKeyComparator::default()));
    let table_options = PlainTableOptions::default();
    let mut builder = PlainTableBuilder::new(options.clone(), table_options, Vec::new()).unwrap();
    for ((key, _), value) in ENTRIES.iter().zip(values(23)) {
        let key = InternalKey::new(key.as_bytes().to_vec(), 1, ValueType::Value).encode();
        builder.add(&key, &value).unwrap();
    }
    builder.finish().unwrap();
    let table =
        PlainTableReader::open(options, table_options, Arc::new(InMemoryFile::new(builder.into_inner()))).unwrap();
    let offset = |key: &str| table.approximate_offset_of(&lookup_key(key.as_bytes(), 100));

    between(offset("abc"), 0, 0);
    between(offset("k01"), 0, 0);
    between(offset("k03"), 0, 100);
    between(offset("k04"), 10000, 11000);
    between(offset("k05"), 210000, 211000);
    between(offset("k06"), 510000, 511000);
    between(offset("k07"), 510000, 511000);
    between(offset("xyz"), 610000, 612000);

    let keys = ["abc", "k01", "k02", "k03", "k04", "k05", "k06", "k07", "xyz"];
    check_monotonic(&keys.iter().map(|k| offset(k)).collect::<Vec<_>>());
}
