//! Block-based table builder.
//!
//! Builds a table file from a sequence of sorted key-value pairs.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Write;

use log::{debug, trace};

use crate::config::{BlockBasedTableOptions, CompressionType, Options};
use crate::error::{Error, Result};
use crate::sstable::block::BlockBuilder;
use crate::sstable::filter_block::{filter_block_name, FilterBlockBuilder};
use crate::sstable::flush_policy::FlushBlockPolicy;
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::format::{compress_block, write_raw_block};
use crate::sstable::index::IndexBuilder;
use crate::sstable::properties::{CollectorSet, TableProperties, PROPERTIES_BLOCK_NAME};
use crate::sstable::{BLOCK_BASED_TABLE_MAGIC, BLOCK_TRAILER_SIZE};

/// BlockBasedTableBuilder builds a block-based table.
///
/// Usage:
/// ```
/// use tablestore::config::{BlockBasedTableOptions, Options};
/// use tablestore::sstable::BlockBasedTableBuilder;
///
/// let mut builder =
///     BlockBasedTableBuilder::new(Options::default(), BlockBasedTableOptions::default(), Vec::new()).unwrap();
/// builder.add(b"key1", b"value1").unwrap();
/// builder.add(b"key2", b"value2").unwrap();
/// let size = builder.finish().unwrap();
/// assert_eq!(size as usize, builder.into_inner().len());
/// ```
pub struct BlockBasedTableBuilder<W: Write> {
    options: Options,
    writer: W,
    offset: u64,
    data_block: BlockBuilder,
    index_block: IndexBuilder,
    filter_block: Option<FilterBlockBuilder>,
    flush_policy: Box<dyn FlushBlockPolicy>,
    collectors: CollectorSet,
    props: TableProperties,
    last_key: Vec<u8>,
    pending_handle: Option<BlockHandle>,
    status: Option<Error>,
    closed: bool,
}

impl<W: Write> BlockBasedTableBuilder<W> {
    /// Create a builder writing the table to `writer`.
    pub fn new(options: Options, table_options: BlockBasedTableOptions, writer: W) -> Result<Self> {
        options.validate()?;
        table_options.validate()?;

        let flush_policy = table_options.flush_block_policy_factory.new_policy(&table_options);
        let filter_block = table_options.filter_policy.clone().map(FilterBlockBuilder::new);
        let collectors = CollectorSet::new(&options.table_properties_collectors);

        Ok(Self {
            data_block: BlockBuilder::new(table_options.block_restart_interval),
            index_block: IndexBuilder::new(),
            filter_block,
            flush_policy,
            collectors,
            options,
            writer,
            offset: 0,
            props: TableProperties::default(),
            last_key: Vec::new(),
            pending_handle: None,
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

    /// Add a key-value pair to the table.
    ///
    /// Keys must be strictly increasing under the configured comparator;
    /// a key out of order is rejected and leaves the builder unchanged.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;

        if self.props.num_entries > 0
            && self.options.comparator.compare(key, &self.last_key) != Ordering::Greater
        {
            return Err(Error::invalid_argument("Keys must be added in strictly increasing order"));
        }

        if self.flush_policy.update(key, value, &self.data_block) {
            let result = self.flush();
            self.latch(result)?;
        }

        if let Some(handle) = self.pending_handle.take() {
            let mut separator = std::mem::take(&mut self.last_key);
            self.options.comparator.find_shortest_separator(&mut separator, key);
            self.index_block.add_entry(&separator, &handle);
        }

        if let Some(filter) = self.filter_block.as_mut() {
            filter.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.data_block.add(key, value);

        self.props.num_entries += 1;
        self.props.raw_key_size += key.len() as u64;
        self.props.raw_value_size += value.len() as u64;

        let result = self.collectors.add(key, value);
        self.latch(result)
    }

    /// Write out the current data block, if any.
    ///
    /// Its index entry is added once the next key (or the end of the table)
    /// is known.
    fn flush(&mut self) -> Result<()> {
        self.check_writable()?;
        if self.data_block.is_empty() {
            return Ok(());
        }

        let raw = self.data_block.finish();
        let handle = self.write_block(&raw, self.options.compression)?;
        self.props.num_data_blocks += 1;
        self.props.data_size = self.offset;
        self.pending_handle = Some(handle);

        trace!("Flushed data block #{} at offset {} ({} bytes)", self.props.num_data_blocks, handle.offset, handle.size);
        Ok(())
    }

    /// Compress and write one block with its trailer.
    fn write_block(&mut self, raw: &[u8], compression: CompressionType) -> Result<BlockHandle> {
        let result = compress_block(raw, compression, self.options.compression_level)
            .and_then(|(ty, stored)| write_raw_block(&mut self.writer, self.offset, &stored, ty));
        let handle = self.latch(result)?;
        self.offset += handle.size + BLOCK_TRAILER_SIZE as u64;
        Ok(handle)
    }

    /// Finish building the table.
    ///
    /// Writes the last data block, the filter, properties, metaindex and
    /// index blocks and the footer. Returns the final file size. The builder
    /// cannot be used afterwards.
    pub fn finish(&mut self) -> Result<u64> {
        self.flush()?;
        self.closed = true;

        if let Some(handle) = self.pending_handle.take() {
            let mut successor = std::mem::take(&mut self.last_key);
            self.options.comparator.find_short_successor(&mut successor);
            self.index_block.add_entry(&successor, &handle);
        }

        let mut meta_entries: BTreeMap<String, BlockHandle> = BTreeMap::new();

        if let Some(mut filter) = self.filter_block.take() {
            let contents = filter.finish();
            let handle = self.write_block(&contents, CompressionType::None)?;
            self.props.filter_size = contents.len() as u64;
            self.props.filter_policy_name = filter.policy().name().to_string();
            meta_entries.insert(filter_block_name(filter.policy().as_ref()), handle);
        }

        let index_contents = self.index_block.finish();
        let (index_compression, index_stored) =
            compress_block(&index_contents, self.options.compression, self.options.compression_level)?;

        self.props.index_size = (index_stored.len() + BLOCK_TRAILER_SIZE) as u64;
        self.props.comparator_name = self.options.comparator.name().to_string();
        let collected = self.collectors.finish();
        self.props.user_collected_properties = self.latch(collected)?;

        let properties = self.props.encode();
        let properties_handle = self.write_block(&properties, CompressionType::None)?;
        meta_entries.insert(PROPERTIES_BLOCK_NAME.to_string(), properties_handle);

        let mut metaindex = BlockBuilder::new(1);
        for (name, handle) in &meta_entries {
            metaindex.add(name.as_bytes(), &handle.encode());
        }
        let metaindex_handle = self.write_block(&metaindex.finish(), CompressionType::None)?;

        let result = write_raw_block(&mut self.writer, self.offset, &index_stored, index_compression);
        let index_handle = self.latch(result)?;
        self.offset += index_handle.size + BLOCK_TRAILER_SIZE as u64;

        let footer = Footer::new(metaindex_handle, index_handle);
        let result = footer
            .write_to(&mut self.writer, BLOCK_BASED_TABLE_MAGIC)
            .and_then(|_| self.writer.flush().map_err(Error::from));
        self.latch(result)?;
        self.offset += crate::sstable::FOOTER_SIZE as u64;

        debug!(
            "Finished table: {} entries in {} data blocks, {} bytes",
            self.props.num_entries, self.props.num_data_blocks, self.offset
        );
        Ok(self.offset)
    }

    /// Give up on the table. Whatever was written is left as is.
    pub fn abandon(&mut self) {
        self.closed = true;
    }

    /// Number of entries added so far
    pub fn num_entries(&self) -> u64 {
        self.props.num_entries
    }

    /// Bytes written so far; the final file size after `finish`
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
