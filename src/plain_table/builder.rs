//! Plain table builder.

use std::cmp::Ordering;
use std::io::Write;
use std::sync::Arc;

use log::debug;

use crate::coding::{put_varint32, put_varint64};
use crate::config::{CompressionType, Options, PlainTableIndexType, PlainTableOptions};
use crate::error::{Error, Result};
use crate::memtable::internal_key::{extract_user_key, TAG_SIZE};
use crate::plain_table::index::{HashIndexBuilder, TotalOrderIndexBuilder};
use crate::plain_table::{names, prefix_extractor, PLAIN_TABLE_MAGIC};
use crate::slice_transform::SliceTransform;
use crate::sstable::block::BlockBuilder;
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::format::write_raw_block;
use crate::sstable::properties::{CollectorSet, TableProperties, PROPERTIES_BLOCK_NAME};
use crate::sstable::{BLOCK_TRAILER_SIZE, FOOTER_SIZE};

enum IndexBuilder {
    TotalOrder(TotalOrderIndexBuilder),
    Hash(HashIndexBuilder),
}

/// Builds a plain table from internal keys in increasing order.
pub struct PlainTableBuilder<W: Write> {
    options: Options,
    table_options: PlainTableOptions,
    writer: W,
    offset: u64,
    extractor: Option<Arc<dyn SliceTransform>>,
    index: IndexBuilder,
    collectors: CollectorSet,
    props: TableProperties,
    last_key: Vec<u8>,
    record: Vec<u8>,
    status: Option<Error>,
    closed: bool,
}

impl<W: Write> PlainTableBuilder<W> {
    /// Create a builder writing the table to `writer`.
    ///
    /// `options.comparator` must order internal keys.
    pub fn new(options: Options, table_options: PlainTableOptions, writer: W) -> Result<Self> {
        options.validate()?;
        table_options.validate()?;

        let extractor = prefix_extractor(&options, &table_options)?;
        let index = match table_options.index_type {
            PlainTableIndexType::TotalOrder => IndexBuilder::TotalOrder(TotalOrderIndexBuilder::default()),
            hash => IndexBuilder::Hash(HashIndexBuilder::new(hash)),
        };
        let collectors = CollectorSet::new(&options.table_properties_collectors);

        Ok(Self {
            options,
            table_options,
            writer,
            offset: 0,
            extractor,
            index,
            collectors,
            props: TableProperties::default(),
            last_key: Vec::new(),
            record: Vec::new(),
            status: None,
            closed: false,
        })
    }

    fn check_writable(&self) -> Result<()> {
        if self.closed {
            return Err(Error::invalid_state("table builder already finished or abandoned"));
        }
        self.status()
    }

    fn latch<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if self.status.is_none() {
                self.status = Some(err.clone());
            }
        }
        result
    }

    /// Add an entry. `key` must be an internal key greater than the last one.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;

        if key.len() < TAG_SIZE {
            return Err(Error::invalid_argument("plain table keys must be internal keys"));
        }
        let user_key_len = self.table_options.user_key_len as usize;
        if user_key_len > 0 && key.len() != user_key_len + TAG_SIZE {
            return Err(Error::invalid_argument(format!(
                "user key length {} differs from the fixed length {}",
                key.len() - TAG_SIZE,
                user_key_len
            )));
        }
        if self.props.num_entries > 0
            && self.options.comparator.compare(key, &self.last_key) != Ordering::Greater
        {
            return Err(Error::invalid_argument("Keys must be added in strictly increasing order"));
        }

        let user_key = extract_user_key(key);
        if let Some(extractor) = &self.extractor {
            if !extractor.in_domain(user_key) {
                return Err(Error::invalid_argument("key is outside the prefix extractor's domain"));
            }
        }
        let Ok(record_offset) = u32::try_from(self.offset) else {
            return Err(Error::not_supported("plain tables are limited to 4GiB"));
        };

        self.record.clear();
        if user_key_len == 0 {
            put_varint32(&mut self.record, key.len() as u32);
        }
        self.record.extend_from_slice(key);
        put_varint32(&mut self.record, value.len() as u32);
        self.record.extend_from_slice(value);

        let result = self.writer.write_all(&self.record).map_err(Error::from);
        self.latch(result)?;
        self.offset += self.record.len() as u64;

        match (&mut self.index, &self.extractor) {
            (IndexBuilder::TotalOrder(index), _) => index.add_record(record_offset),
            (IndexBuilder::Hash(index), Some(extractor)) => {
                index.add_record(extractor.transform(user_key), record_offset)
            }
            (IndexBuilder::Hash(index), None) => index.add_record(user_key, record_offset),
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.props.num_entries += 1;
        self.props.raw_key_size += key.len() as u64;
        self.props.raw_value_size += value.len() as u64;

        let result = self.collectors.add(key, value);
        self.latch(result)
    }

    fn write_block(&mut self, contents: &[u8]) -> Result<BlockHandle> {
        let result = write_raw_block(&mut self.writer, self.offset, contents, CompressionType::None);
        let handle = self.latch(result)?;
        self.offset += handle.size + BLOCK_TRAILER_SIZE as u64;
        Ok(handle)
    }

    /// Finish the table. Returns the final file size.
    pub fn finish(&mut self) -> Result<u64> {
        self.check_writable()?;
        self.closed = true;

        self.props.data_size = self.offset;
        self.props.num_data_blocks = u64::from(self.props.num_entries > 0);

        let (region, bloom_len) = match &mut self.index {
            IndexBuilder::TotalOrder(index) => (index.finish(), 0),
            IndexBuilder::Hash(index) => {
                index.finish(self.table_options.hash_table_ratio, self.table_options.bloom_bits_per_prefix)
            }
        };
        let index_handle = self.write_block(&region)?;
        self.props.index_size = region.len() as u64;
        self.props.filter_size = bloom_len as u64;
        self.props.comparator_name = self.options.comparator.name().to_string();

        let mut user_key_len = Vec::new();
        put_varint64(&mut user_key_len, u64::from(self.table_options.user_key_len));
        let extractor_name = self.extractor.as_ref().map(|e| e.name().to_string()).unwrap_or_default();
        let format = &mut self.props.format_properties;
        format.insert(names::USER_KEY_LEN.to_string(), user_key_len);
        format.insert(names::INDEX_TYPE.to_string(), vec![self.table_options.index_type as u8]);
        format.insert(names::PREFIX_EXTRACTOR.to_string(), extractor_name.into_bytes());

        let collected = self.collectors.finish();
        self.props.user_collected_properties = self.latch(collected)?;

        let properties_handle = self.write_block(&self.props.encode())?;
        let mut metaindex = BlockBuilder::new(1);
        metaindex.add(PROPERTIES_BLOCK_NAME.as_bytes(), &properties_handle.encode());
        let metaindex_handle = self.write_block(&metaindex.finish())?;

        let footer = Footer::new(metaindex_handle, index_handle);
        let result = footer
            .write_to(&mut self.writer, PLAIN_TABLE_MAGIC)
            .and_then(|_| self.writer.flush().map_err(Error::from));
        self.latch(result)?;
        self.offset += FOOTER_SIZE as u64;

        debug!(
            "Finished plain table: {} entries, {:?} index, {} bytes",
            self.props.num_entries, self.table_options.index_type, self.offset
        );
        Ok(self.offset)
    }

    /// Give up on the table.
    pub fn abandon(&mut self) {
        self.closed = true;
    }

    /// Number of entries added so far
    pub fn num_entries(&self) -> u64 {
        self.props.num_entries
    }

    /// Bytes written so far
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// First error encountered, if any
    pub fn status(&self) -> Result<()> {
        match &self.status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Properties gathered so far
    pub fn properties(&self) -> &TableProperties {
        &self.props
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memtable::internal_key::{InternalKey, InternalKeyComparator, ValueType};

    fn internal_options() -> Options {
        Options::default().comparator(Arc::new(InternalKeyComparator::default()))
    }

    fn ikey(user_key: &[u8], seq: u64) -> Vec<u8> {
        InternalKey::new(user_key.to_vec(), seq, ValueType::Value).encode()
    }

    #[test]
    fn test_basic_properties() {
        let table_options = PlainTableOptions::default().user_key_len(8);
        let mut builder = PlainTableBuilder::new(internal_options(), table_options, Vec::new()).unwrap();
        for c in b'a'..=b'z' {
            builder.add(&ikey(&[c; 8], 1), &[c + 42; 28]).unwrap();
        }
        let size = builder.finish().unwrap();

        let props = builder.properties();
        assert_eq!(props.num_entries, 26);
        assert_eq!(props.raw_key_size, 16 * 26);
        assert_eq!(props.raw_value_size, 28 * 26);
        assert_eq!(props.num_data_blocks, 1);
        assert_eq!(props.filter_size, 0);
        // Fixed-length keys carry no length prefix: key + 1-byte value length + value
        assert_eq!(props.data_size, 26 * (16 + 1 + 28));
        assert_eq!(builder.into_inner().len() as u64, size);
    }

    #[test]
    fn test_rejects_bad_keys() {
        let table_options = PlainTableOptions::default().user_key_len(4);
        let mut builder = PlainTableBuilder::new(internal_options(), table_options, Vec::new()).unwrap();

        assert!(matches!(builder.add(b"short", b"v"), Err(Error::InvalidArgument(_))));
        assert!(matches!(builder.add(&ikey(b"toolong", 1), b"v"), Err(Error::InvalidArgument(_))));
        builder.add(&ikey(b"bbbb", 1), b"v").unwrap();
        assert!(matches!(builder.add(&ikey(b"aaaa", 1), b"v"), Err(Error::InvalidArgument(_))));
        assert!(builder.status().is_ok());
        builder.finish().unwrap();
        assert!(builder.add(&ikey(b"cccc", 1), b"v").is_err());
    }

    #[test]
    fn test_hash_index_requires_extractor() {
        let table_options = PlainTableOptions::default().index_type(PlainTableIndexType::HashFixedPrefix);
        assert!(PlainTableBuilder::new(internal_options(), table_options, Vec::new()).is_err());
    }
}
