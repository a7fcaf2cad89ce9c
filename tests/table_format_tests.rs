//! On-disk format checks: corruption detection, magic numbers, comparator
//! identity, compression and the table factories.

mod common;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

use tablestore::env::{FileSource, InMemoryFile, MemSink};
use tablestore::memtable::internal_key::{extract_user_key, lookup_key, InternalKeyComparator, ValueType};
use tablestore::table::{build_table, BlockBasedTableFactory, PlainTableFactory, TableFactory};
use tablestore::{
    BlockBasedTable, BlockBasedTableBuilder, BlockBasedTableOptions, CompressionType, Error, KvIterator, MemTable,
    Options, PlainTableOptions, PlainTableReader, ReadOptions, ReverseBytewiseComparator,
};
use tempfile::TempDir;

fn build(options: &Options, table_options: &BlockBasedTableOptions, n: usize) -> Vec<u8> {
    let mut builder = BlockBasedTableBuilder::new(options.clone(), table_options.clone(), Vec::new()).unwrap();
    for i in 0..n {
        builder.add(format!("key{:05}", i).as_bytes(), format!("value{:05}", i).as_bytes()).unwrap();
    }
    builder.finish().unwrap();
    builder.into_inner()
}

fn open(data: Vec<u8>, options: &Options, table_options: &BlockBasedTableOptions) -> tablestore::Result<BlockBasedTable> {
    BlockBasedTable::open(options.clone(), table_options.clone(), Arc::new(InMemoryFile::new(data)))
}

fn scan(iter: &mut dyn KvIterator) -> tablestore::Result<usize> {
    let mut count = 0;
    iter.seek_to_first();
    while iter.valid() {
        count += 1;
        iter.next();
    }
    iter.status().map(|_| count)
}

#[test]
fn test_every_flipped_bit_in_data_is_detected() {
    common::init_logger();
    let options = Options::default().compression(CompressionType::None);
    let table_options = BlockBasedTableOptions::default().block_size(256);
    let data = build(&options, &table_options, 100);
    let data_size = open(data.clone(), &options, &table_options).unwrap().table_properties().data_size as usize;

    for pos in (0..data_size).step_by(97) {
        let mut corrupted = data.clone();
        corrupted[pos] ^= 0x01;
        let table = open(corrupted, &options, &table_options).unwrap();
        let err = scan(&mut table.new_iterator(&ReadOptions::default())).unwrap_err();
        assert!(err.is_corruption(), "flip at {} gave {:?}", pos, err);
    }
}

#[test]
fn test_unverified_reads_skip_checksums() {
    let options = Options::default().compression(CompressionType::None);
    let table_options = BlockBasedTableOptions::default();
    let mut data = build(&options, &table_options, 10);
    // Last byte of the first value
    let pos = data.windows(10).position(|w| w == b"value00000").unwrap() + 9;
    data[pos] = b'X';

    let table = open(data, &options, &table_options).unwrap();
    assert!(table.get(&ReadOptions::default(), b"key00000").unwrap_err().is_corruption());

    let unverified = ReadOptions::default().verify_checksums(false);
    let (_, value) = table.get(&unverified, b"key00000").unwrap().unwrap();
    assert_eq!(value, b"value0000X");
}

#[test]
fn test_magic_numbers_separate_formats() {
    let options = Options::default().comparator(Arc::new(InternalKeyComparator::default()));
    let block_based = build(&options, &BlockBasedTableOptions::default(), 0);
    let err = PlainTableReader::open(options.clone(), PlainTableOptions::default(), Arc::new(InMemoryFile::new(block_based)))
        .err()
        .unwrap();
    assert!(matches!(err, Error::Corruption(_)));

    let sink = MemSink::new();
    let factory = PlainTableFactory::default();
    let mut builder = factory.new_builder(&options, Box::new(sink.clone())).unwrap();
    builder.finish().unwrap();
    let err = open(sink.contents().to_vec(), &options, &BlockBasedTableOptions::default()).err().unwrap();
    assert!(matches!(err, Error::Corruption(_)));
}

#[test]
fn test_comparator_name_must_match() {
    let reverse = Options::default().comparator(Arc::new(ReverseBytewiseComparator));
    let table_options = BlockBasedTableOptions::default();
    let mut builder = BlockBasedTableBuilder::new(reverse.clone(), table_options.clone(), Vec::new()).unwrap();
    builder.add(b"b", b"2").unwrap();
    builder.add(b"a", b"1").unwrap();
    builder.finish().unwrap();
    let data = builder.into_inner();

    assert!(matches!(open(data.clone(), &Options::default(), &table_options), Err(Error::Corruption(_))));
    let table = open(data, &reverse, &table_options).unwrap();
    assert_eq!(table.table_properties().comparator_name, "tablestore.ReverseBytewiseComparator");
}

#[test]
fn test_compressed_tables_round_trip() {
    for compression in common::compressions() {
        let options = Options::default().compression(compression);
        let table_options = BlockBasedTableOptions::default().block_size(512);
        let data = build(&options, &table_options, 1000);
        let table = open(data.clone(), &options, &table_options).unwrap();

        assert_eq!(scan(&mut table.new_iterator(&ReadOptions::default())).unwrap(), 1000);
        let (_, value) = table.get(&ReadOptions::default(), b"key00500").unwrap().unwrap();
        assert_eq!(value, b"value00500");

        // Reading does not depend on the codec configured at open
        let other = Options::default().compression(CompressionType::None);
        let table = open(data, &other, &table_options).unwrap();
        assert_eq!(scan(&mut table.new_iterator(&ReadOptions::default())).unwrap(), 1000);
    }
}

#[test]
fn test_flush_memtable_to_files() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().comparator(Arc::new(InternalKeyComparator::default()));
    let memtable = MemTable::default();
    for i in 0..500u64 {
        memtable.add(i + 1, ValueType::Value, format!("user{:04}", i).as_bytes(), &i.to_le_bytes());
    }
    memtable.add(1000, ValueType::Deletion, b"user0042", b"");

    let factories: Vec<Box<dyn TableFactory>> =
        vec![Box::new(BlockBasedTableFactory::default()), Box::new(PlainTableFactory::default())];
    for factory in factories {
        let path = dir.path().join(format!("{}.tbl", factory.name()));
        let writer = BufWriter::new(File::create(&path).unwrap());
        let size = build_table(factory.as_ref(), &options, &mut memtable.new_iterator(), Box::new(writer)).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size);

        let table = factory.open_table(&options, Arc::new(FileSource::open(&path).unwrap())).unwrap();
        assert_eq!(table.table_properties().num_entries, 501);
        assert_eq!(scan(&mut table.new_iterator(&ReadOptions::default())).unwrap(), 501);

        let (key, value) = table.get(&ReadOptions::default(), &lookup_key(b"user0100", 2000)).unwrap().unwrap();
        assert_eq!(extract_user_key(&key), b"user0100");
        assert_eq!(value, 100u64.to_le_bytes());

        // The tombstone is the newest version of its key
        let (key, value) = table.get(&ReadOptions::default(), &lookup_key(b"user0042", 2000)).unwrap().unwrap();
        assert_eq!(extract_user_key(&key), b"user0042");
        assert!(value.is_empty());
    }
}

#[test]
fn test_builder_io_failure_is_reported() {
    struct FailAfter(usize);

    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.0 < buf.len() {
                return Err(std::io::Error::other("disk full"));
            }
            self.0 -= buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let options = Options::default().compression(CompressionType::None);
    let table_options = BlockBasedTableOptions::default().block_size(128);
    let mut builder = BlockBasedTableBuilder::new(options, table_options, FailAfter(1000)).unwrap();
    let mut failed = false;
    for i in 0..1000 {
        if builder.add(format!("key{:05}", i).as_bytes(), b"some value bytes").is_err() {
            failed = true;
            break;
        }
    }
    assert!(failed);
    assert!(matches!(builder.status(), Err(Error::Io(_))));
    assert!(builder.finish().is_err());
}
