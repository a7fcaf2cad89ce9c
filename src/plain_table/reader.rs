//! Plain table reader.
//!
//! The whole file is loaded into one buffer at open time and records are
//! decoded in place.

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};

use crate::coding::{decode_varint32, decode_varint64};
use crate::comparator::bytewise;
use crate::config::{Options, PlainTableIndexType, PlainTableOptions, ReadOptions};
use crate::env::{InMemoryFile, RandomAccessFile};
use crate::error::{Error, Result};
use crate::iterator::KvIterator;
use crate::memtable::internal_key::{extract_user_key, TAG_SIZE};
use crate::plain_table::index::PlainIndex;
use crate::plain_table::{names, prefix_extractor, PLAIN_TABLE_MAGIC};
use crate::slice_transform::SliceTransform;
use crate::sstable::block::Block;
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::format::read_block;
use crate::sstable::properties::{TableProperties, PROPERTIES_BLOCK_NAME};
use crate::sstable::FOOTER_SIZE;
use crate::statistics::{record_tick, Ticker};

/// Location of one decoded record within the file buffer.
#[derive(Debug, Clone, Copy, Default)]
struct Record {
    key_start: usize,
    key_end: usize,
    value_start: usize,
    value_end: usize,
}

impl Record {
    fn next_offset(&self) -> usize {
        self.value_end
    }
}

struct Rep {
    options: Options,
    table_options: PlainTableOptions,
    data: Bytes,
    data_end: usize,
    index: PlainIndex,
    extractor: Option<Arc<dyn SliceTransform>>,
    properties: Arc<TableProperties>,
}

/// A plain table opened for reading.
#[derive(Clone)]
pub struct PlainTableReader {
    rep: Arc<Rep>,
}

impl PlainTableReader {
    /// Open the plain table stored in `file`.
    ///
    /// `table_options` and the prefix extractor must match the ones the
    /// table was built with.
    pub fn open(options: Options, table_options: PlainTableOptions, file: Arc<dyn RandomAccessFile>) -> Result<Self> {
        table_options.validate()?;
        let size = file.size();
        if size < FOOTER_SIZE as u64 {
            return Err(Error::corruption("file is too short to be a table"));
        }
        let size = usize::try_from(size).map_err(|_| Error::not_supported("plain table does not fit in memory"))?;

        let data = file.read(0, size)?;
        let footer = Footer::decode(&data[size - FOOTER_SIZE..], PLAIN_TABLE_MAGIC)?;
        let contents = InMemoryFile::new(data.clone());

        let metaindex = Block::new(read_block(&contents, &footer.metaindex_handle, true)?)?;
        let mut iter = metaindex.iter(bytewise());
        iter.seek(PROPERTIES_BLOCK_NAME.as_bytes());
        let properties_handle = if iter.valid() && iter.key() == PROPERTIES_BLOCK_NAME.as_bytes() {
            BlockHandle::decode(iter.value())?
        } else {
            iter.status()?;
            return Err(Error::corruption("table has no properties block"));
        };
        let properties = TableProperties::decode(&Block::new(read_block(&contents, &properties_handle, true)?)?)?;

        if properties.comparator_name != options.comparator.name() {
            warn!(
                "Comparator mismatch: table uses {}, opened with {}",
                properties.comparator_name,
                options.comparator.name()
            );
            return Err(Error::corruption(format!(
                "comparator mismatch: table uses {}, opened with {}",
                properties.comparator_name,
                options.comparator.name()
            )));
        }

        let format = &properties.format_properties;
        let stored_key_len = format
            .get(names::USER_KEY_LEN)
            .and_then(|v| decode_varint64(v))
            .ok_or_else(|| Error::corruption("missing plain table user key length"))?
            .0;
        if stored_key_len != u64::from(table_options.user_key_len) {
            return Err(Error::invalid_argument(format!(
                "table has user key length {}, opened with {}",
                stored_key_len, table_options.user_key_len
            )));
        }
        let stored_index_type = format
            .get(names::INDEX_TYPE)
            .and_then(|v| v.first().copied())
            .and_then(PlainTableIndexType::from_u8)
            .ok_or_else(|| Error::corruption("missing plain table index type"))?;
        if stored_index_type != table_options.index_type {
            return Err(Error::invalid_argument(format!(
                "table has a {:?} index, opened with {:?}",
                stored_index_type, table_options.index_type
            )));
        }
        let extractor = prefix_extractor(&options, &table_options)?;
        let extractor_name = extractor.as_ref().map(|e| e.name()).unwrap_or_default();
        let stored_extractor = format.get(names::PREFIX_EXTRACTOR).map(Vec::as_slice).unwrap_or_default();
        if stored_extractor != extractor_name.as_bytes() {
            return Err(Error::invalid_argument(format!(
                "table uses prefix extractor {:?}, opened with {:?}",
                String::from_utf8_lossy(stored_extractor),
                extractor_name
            )));
        }

        let index = PlainIndex::decode(read_block(&contents, &footer.index_handle, true)?)?;
        let data_end = usize::try_from(properties.data_size).unwrap_or(usize::MAX);
        if data_end > footer.index_handle.offset as usize {
            return Err(Error::corruption("plain table data overlaps its index"));
        }
        let index_type_matches = match &index {
            PlainIndex::TotalOrder { .. } => table_options.index_type == PlainTableIndexType::TotalOrder,
            PlainIndex::Hash { index_type, .. } => *index_type == table_options.index_type,
        };
        if !index_type_matches {
            return Err(Error::corruption("plain table index does not match its properties"));
        }

        debug!(
            "Opened plain table: {} bytes, {} entries, {:?} index",
            size, properties.num_entries, table_options.index_type
        );
        Ok(Self {
            rep: Arc::new(Rep {
                options,
                table_options,
                data,
                data_end,
                index,
                extractor,
                properties: Arc::new(properties),
            }),
        })
    }

    /// Find the first entry `>= key` that the index can reach.
    ///
    /// With a hash index only entries sharing the prefix of `key` are
    /// considered.
    pub fn get(&self, _read_options: &ReadOptions, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut iter = self.new_iterator();
        iter.seek(key);
        if iter.valid() {
            return Ok(Some((iter.key().to_vec(), iter.value().to_vec())));
        }
        iter.status()?;
        Ok(None)
    }

    /// Iterator over the table.
    pub fn new_iterator(&self) -> PlainTableIterator {
        PlainTableIterator {
            rep: Arc::clone(&self.rep),
            idx: 0,
            record: Record::default(),
            valid: false,
            status: None,
        }
    }

    /// Approximate file offset of the data for `key`.
    ///
    /// Only a total-order index can answer; hash-indexed tables report 0.
    pub fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        let rep = &self.rep;
        if rep.index.num_records() == 0 {
            return if rep.table_options.index_type.is_hash() { 0 } else { rep.data_end as u64 };
        }
        match rep.lower_bound(key).ok().and_then(|idx| rep.index.record_offset(idx)) {
            Some(offset) => offset as u64,
            None => rep.data_end as u64,
        }
    }

    /// Properties stored in the table.
    pub fn table_properties(&self) -> Arc<TableProperties> {
        Arc::clone(&self.rep.properties)
    }
}

impl Rep {
    fn parse_record(&self, offset: usize) -> Result<Record> {
        let bad = || Error::corruption(format!("bad plain table record at offset {}", offset));
        let data = self.data.get(..self.data_end).ok_or_else(bad)?;
        let mut pos = offset;

        let key_len = match self.table_options.user_key_len {
            0 => {
                let (len, n) = decode_varint32(data.get(pos..).ok_or_else(bad)?).ok_or_else(bad)?;
                pos += n;
                len as usize
            }
            len => len as usize + TAG_SIZE,
        };
        let key_start = pos;
        let key_end = key_start + key_len;
        if key_end > data.len() || key_len < TAG_SIZE {
            return Err(bad());
        }

        let (value_len, n) = decode_varint32(&data[key_end..]).ok_or_else(bad)?;
        let value_start = key_end + n;
        let value_end = value_start + value_len as usize;
        if value_end > data.len() {
            return Err(bad());
        }
        Ok(Record { key_start, key_end, value_start, value_end })
    }

    fn key_of(&self, record: &Record) -> &[u8] {
        &self.data[record.key_start..record.key_end]
    }

    /// Index of the first record `>= target` in a total-order index.
    fn lower_bound(&self, target: &[u8]) -> Result<usize> {
        let cmp = &self.options.comparator;
        let (mut lo, mut hi) = (0, self.index.num_records());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let offset = self
                .index
                .record_offset(mid)
                .ok_or_else(|| Error::corruption(format!("missing record offset {}", mid)))?;
            let record = self.parse_record(offset)?;
            if cmp.compare(self.key_of(&record), target) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    fn prefix<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        let user_key = extract_user_key(key);
        match &self.extractor {
            Some(extractor) => extractor.transform(user_key),
            None => user_key,
        }
    }
}

/// Iterator over a plain table.
///
/// With a hash index, `seek` only reaches keys sharing the target's prefix
/// and backward movement fails with `NotSupported`.
pub struct PlainTableIterator {
    rep: Arc<Rep>,
    idx: usize,
    record: Record,
    valid: bool,
    status: Option<Error>,
}

impl PlainTableIterator {
    fn total_order(&self) -> bool {
        !self.rep.table_options.index_type.is_hash()
    }

    fn fail(&mut self, err: Error) {
        self.valid = false;
        if self.status.is_none() {
            self.status = Some(err);
        }
    }

    fn position_at(&mut self, offset: usize) {
        if offset >= self.rep.data_end {
            self.valid = false;
            return;
        }
        match self.rep.parse_record(offset) {
            Ok(record) => {
                self.record = record;
                self.valid = true;
            }
            Err(err) => self.fail(err),
        }
    }

    fn position_at_index(&mut self, idx: usize) {
        self.idx = idx;
        match self.rep.index.record_offset(idx) {
            Some(offset) => self.position_at(offset),
            None => self.valid = false,
        }
    }

    fn prefix_seek(&mut self, target: &[u8]) {
        self.valid = false;
        if target.len() < TAG_SIZE {
            self.fail(Error::invalid_argument("seek target is not an internal key"));
            return;
        }
        let rep = Arc::clone(&self.rep);
        let user_key = extract_user_key(target);
        if let Some(extractor) = &rep.extractor {
            if !extractor.in_domain(user_key) {
                return;
            }
        }
        let prefix = rep.prefix(target);
        if !rep.index.prefix_may_match(prefix) {
            record_tick(rep.options.statistics.as_deref(), Ticker::BloomFilterUseful);
            return;
        }

        let mut offset = match rep.index.find_prefix(prefix) {
            Ok(Some(offset)) => offset,
            Ok(None) => return,
            Err(err) => return self.fail(err),
        };
        let cmp = &rep.options.comparator;
        while offset < rep.data_end {
            let record = match rep.parse_record(offset) {
                Ok(record) => record,
                Err(err) => return self.fail(err),
            };
            let key = rep.key_of(&record);
            if rep.prefix(key) != prefix {
                return;
            }
            if cmp.compare(key, target) != Ordering::Less {
                self.record = record;
                self.valid = true;
                return;
            }
            offset = record.next_offset();
        }
    }
}

impl KvIterator for PlainTableIterator {
    fn valid(&self) -> bool {
        self.valid
    }

    fn seek_to_first(&mut self) {
        if self.total_order() {
            self.position_at_index(0);
        } else {
            self.position_at(0);
        }
    }

    fn seek_to_last(&mut self) {
        if !self.total_order() {
            return self.fail(Error::not_supported("seek_to_last on a hash-indexed plain table"));
        }
        match self.rep.index.num_records() {
            0 => self.valid = false,
            n => self.position_at_index(n - 1),
        }
    }

    fn seek(&mut self, target: &[u8]) {
        if !self.total_order() {
            return self.prefix_seek(target);
        }
        match self.rep.lower_bound(target) {
            Ok(idx) => self.position_at_index(idx),
            Err(err) => self.fail(err),
        }
    }

    fn next(&mut self) {
        assert!(self.valid, "next() called on an invalid iterator");
        if self.total_order() {
            self.position_at_index(self.idx + 1);
        } else {
            let next = self.record.next_offset();
            self.position_at(next);
        }
    }

    fn prev(&mut self) {
        assert!(self.valid, "prev() called on an invalid iterator");
        if !self.total_order() {
            return self.fail(Error::not_supported("prev on a hash-indexed plain table"));
        }
        match self.idx {
            0 => self.valid = false,
            idx => self.position_at_index(idx - 1),
        }
    }

    fn key(&self) -> &[u8] {
        assert!(self.valid, "key() called on an invalid iterator");
        self.rep.key_of(&self.record)
    }

    fn value(&self) -> &[u8] {
        assert!(self.valid, "value() called on an invalid iterator");
        &self.rep.data[self.record.value_start..self.record.value_end]
    }

    fn status(&self) -> Result<()> {
        match &self.status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memtable::internal_key::{InternalKey, InternalKeyComparator, ValueType};
    use crate::plain_table::PlainTableBuilder;
    use crate::slice_transform::FixedPrefixTransform;
    use crate::statistics::Statistics;

    fn ikey(user_key: &str, seq: u64) -> Vec<u8> {
        InternalKey::new(user_key.as_bytes().to_vec(), seq, ValueType::Value).encode()
    }

    fn options() -> Options {
        Options::default().comparator(Arc::new(InternalKeyComparator::default()))
    }

    fn build(options: &Options, table_options: PlainTableOptions, keys: &[&str]) -> Arc<dyn RandomAccessFile> {
        let mut builder = PlainTableBuilder::new(options.clone(), table_options, Vec::new()).unwrap();
        for key in keys {
            builder.add(&ikey(key, 1), format!("v-{}", key).as_bytes()).unwrap();
        }
        builder.finish().unwrap();
        Arc::new(InMemoryFile::new(builder.into_inner()))
    }

    const KEYS: [&str; 8] = ["aaaa1", "aaaa2", "bbbb1", "cccc1", "cccc5", "cccc9", "dddd1", "dddd2"];

    #[test]
    fn test_total_order_iteration() {
        let opts = options();
        let table_options = PlainTableOptions::default();
        let table = PlainTableReader::open(opts.clone(), table_options, build(&opts, table_options, &KEYS)).unwrap();

        let mut iter = table.new_iterator();
        iter.seek_to_first();
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push(extract_user_key(iter.key()).to_vec());
            iter.next();
        }
        assert_eq!(seen.len(), KEYS.len());

        iter.seek_to_last();
        assert_eq!(extract_user_key(iter.key()), b"dddd2");
        iter.prev();
        assert_eq!(extract_user_key(iter.key()), b"dddd1");

        iter.seek(&ikey("cccc2", 100));
        assert_eq!(extract_user_key(iter.key()), b"cccc5");
        assert_eq!(iter.value(), b"v-cccc5");
        iter.seek(&ikey("zzzz", 100));
        assert!(!iter.valid());
        assert!(iter.status().is_ok());
    }

    #[test]
    fn test_hash_prefix_seek() {
        let stats = Arc::new(Statistics::new());
        let opts = options()
            .prefix_extractor(Arc::new(FixedPrefixTransform::new(4)))
            .statistics(Arc::clone(&stats));
        let table_options = PlainTableOptions::default().index_type(PlainTableIndexType::HashFixedPrefix);
        let table = PlainTableReader::open(opts.clone(), table_options, build(&opts, table_options, &KEYS)).unwrap();

        let mut iter = table.new_iterator();
        iter.seek(&ikey("cccc2", 100));
        assert_eq!(extract_user_key(iter.key()), b"cccc5");
        iter.seek(&ikey("cccc99", 100));
        assert!(!iter.valid());
        iter.seek(&ikey("bbbb0", 100));
        assert_eq!(extract_user_key(iter.key()), b"bbbb1");
        // next crosses into the following prefix in file order
        iter.next();
        assert_eq!(extract_user_key(iter.key()), b"cccc1");

        let ro = ReadOptions::default();
        let misses = (0..50)
            .filter(|i| table.get(&ro, &ikey(&format!("x{:03}1", i), 1)).unwrap().is_none())
            .count();
        assert_eq!(misses, 50);
        assert!(stats.get(Ticker::BloomFilterUseful) > 40);

        iter.seek_to_last();
        assert!(!iter.valid());
        assert!(matches!(iter.status(), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_full_prefix_get() {
        let opts = options();
        let table_options = PlainTableOptions::default().index_type(PlainTableIndexType::HashFullPrefix);
        let table = PlainTableReader::open(opts.clone(), table_options, build(&opts, table_options, &KEYS)).unwrap();
        let ro = ReadOptions::default();

        let (key, value) = table.get(&ro, &ikey("cccc5", 100)).unwrap().unwrap();
        assert_eq!(key, ikey("cccc5", 1));
        assert_eq!(value, b"v-cccc5");
        assert!(table.get(&ro, &ikey("cccc6", 100)).unwrap().is_none());
        assert_eq!(table.approximate_offset_of(&ikey("cccc5", 100)), 0);
    }

    #[test]
    fn test_mismatched_options_rejected() {
        let opts = options();
        let file = build(&opts, PlainTableOptions::default(), &KEYS);

        let fixed_len = PlainTableOptions::default().user_key_len(5);
        assert!(matches!(PlainTableReader::open(opts.clone(), fixed_len, Arc::clone(&file)), Err(Error::InvalidArgument(_))));

        let hashed = PlainTableOptions::default().index_type(PlainTableIndexType::HashFullPrefix);
        assert!(matches!(PlainTableReader::open(opts.clone(), hashed, Arc::clone(&file)), Err(Error::InvalidArgument(_))));

        let bytewise_opts = Options::default();
        assert!(matches!(PlainTableReader::open(bytewise_opts, PlainTableOptions::default(), file), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_approximate_offsets_total_order() {
        let opts = options();
        let table_options = PlainTableOptions::default();
        let table = PlainTableReader::open(opts.clone(), table_options, build(&opts, table_options, &KEYS)).unwrap();

        assert_eq!(table.approximate_offset_of(&ikey("a", 100)), 0);
        let mid = table.approximate_offset_of(&ikey("cccc1", 100));
        assert!(mid > 0 && mid < table.table_properties().data_size);
        assert_eq!(table.approximate_offset_of(&ikey("zzzz", 100)), table.table_properties().data_size);
    }

    #[test]
    fn test_empty_table() {
        let opts = options();
        let table_options = PlainTableOptions::default();
        let table = PlainTableReader::open(opts.clone(), table_options, build(&opts, table_options, &[])).unwrap();
        let mut iter = table.new_iterator();
        iter.seek_to_first();
        assert!(!iter.valid());
        iter.seek_to_last();
        assert!(!iter.valid());
        assert_eq!(table.table_properties().num_entries, 0);
    }
}
