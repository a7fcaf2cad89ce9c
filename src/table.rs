//! Format-independent table interfaces.
//!
//! [`TableFactory`] picks a table format; the builders and readers it hands
//! out are used through the [`TableBuilder`] and [`TableReader`] traits, so a
//! flush path can write either format without knowing which one it has.

use std::io::Write;
use std::sync::Arc;

use log::debug;

use crate::config::{BlockBasedTableOptions, Options, PlainTableOptions, ReadOptions};
use crate::env::RandomAccessFile;
use crate::error::Result;
use crate::iterator::KvIterator;
use crate::plain_table::{PlainTableBuilder, PlainTableReader};
use crate::sstable::{BlockBasedTable, BlockBasedTableBuilder, TableProperties};

/// Writer type handed to builders created by a [`TableFactory`].
pub type TableWriter = Box<dyn Write + Send>;

/// Builds one table from entries in increasing key order.
pub trait TableBuilder: Send {
    /// Add an entry. Keys must be strictly increasing.
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Write the remaining blocks and the footer. Returns the file size.
    fn finish(&mut self) -> Result<u64>;

    /// Stop building; the output is unusable.
    fn abandon(&mut self);

    /// Number of entries added
    fn num_entries(&self) -> u64;

    /// Bytes written so far
    fn file_size(&self) -> u64;

    /// First error encountered, if any
    fn status(&self) -> Result<()>;
}

/// Reads one table.
pub trait TableReader: Send + Sync {
    /// The first entry `>= key` the table's index reaches, if any.
    fn get(&self, read_options: &ReadOptions, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>>;

    /// Iterator over the table.
    fn new_iterator(&self, read_options: &ReadOptions) -> Box<dyn KvIterator>;

    /// Approximate file offset of the data for `key`.
    fn approximate_offset_of(&self, key: &[u8]) -> u64;

    /// Properties stored in the table.
    fn table_properties(&self) -> Arc<TableProperties>;
}

/// Creates builders and readers of one table format.
pub trait TableFactory: Send + Sync {
    /// Name of the format
    fn name(&self) -> &str;

    /// A builder writing a new table to `writer`.
    fn new_builder(&self, options: &Options, writer: TableWriter) -> Result<Box<dyn TableBuilder>>;

    /// Open the table stored in `file`.
    fn open_table(&self, options: &Options, file: Arc<dyn RandomAccessFile>) -> Result<Box<dyn TableReader>>;
}

impl<W: Write + Send> TableBuilder for BlockBasedTableBuilder<W> {
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        BlockBasedTableBuilder::add(self, key, value)
    }

    fn finish(&mut self) -> Result<u64> {
        BlockBasedTableBuilder::finish(self)
    }

    fn abandon(&mut self) {
        BlockBasedTableBuilder::abandon(self)
    }

    fn num_entries(&self) -> u64 {
        BlockBasedTableBuilder::num_entries(self)
    }

    fn file_size(&self) -> u64 {
        BlockBasedTableBuilder::file_size(self)
    }

    fn status(&self) -> Result<()> {
        BlockBasedTableBuilder::status(self)
    }
}

impl<W: Write + Send> TableBuilder for PlainTableBuilder<W> {
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        PlainTableBuilder::add(self, key, value)
    }

    fn finish(&mut self) -> Result<u64> {
        PlainTableBuilder::finish(self)
    }

    fn abandon(&mut self) {
        PlainTableBuilder::abandon(self)
    }

    fn num_entries(&self) -> u64 {
        PlainTableBuilder::num_entries(self)
    }

    fn file_size(&self) -> u64 {
        PlainTableBuilder::file_size(self)
    }

    fn status(&self) -> Result<()> {
        PlainTableBuilder::status(self)
    }
}

impl TableReader for BlockBasedTable {
    fn get(&self, read_options: &ReadOptions, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        BlockBasedTable::get(self, read_options, key)
    }

    fn new_iterator(&self, read_options: &ReadOptions) -> Box<dyn KvIterator> {
        BlockBasedTable::new_iterator(self, read_options)
    }

    fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        BlockBasedTable::approximate_offset_of(self, key)
    }

    fn table_properties(&self) -> Arc<TableProperties> {
        BlockBasedTable::table_properties(self)
    }
}

impl TableReader for PlainTableReader {
    fn get(&self, read_options: &ReadOptions, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        PlainTableReader::get(self, read_options, key)
    }

    fn new_iterator(&self, _read_options: &ReadOptions) -> Box<dyn KvIterator> {
        Box::new(PlainTableReader::new_iterator(self))
    }

    fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        PlainTableReader::approximate_offset_of(self, key)
    }

    fn table_properties(&self) -> Arc<TableProperties> {
        PlainTableReader::table_properties(self)
    }
}

/// Factory for block-based tables.
#[derive(Debug, Clone, Default)]
pub struct BlockBasedTableFactory {
    table_options: BlockBasedTableOptions,
}

impl BlockBasedTableFactory {
    /// A factory using `table_options` for every table.
    pub fn new(table_options: BlockBasedTableOptions) -> Self {
        Self { table_options }
    }

    /// The options tables are built and opened with.
    pub fn table_options(&self) -> &BlockBasedTableOptions {
        &self.table_options
    }
}

impl TableFactory for BlockBasedTableFactory {
    fn name(&self) -> &str {
        "BlockBasedTable"
    }

    fn new_builder(&self, options: &Options, writer: TableWriter) -> Result<Box<dyn TableBuilder>> {
        let builder = BlockBasedTableBuilder::new(options.clone(), self.table_options.clone(), writer)?;
        Ok(Box::new(builder))
    }

    fn open_table(&self, options: &Options, file: Arc<dyn RandomAccessFile>) -> Result<Box<dyn TableReader>> {
        let table = BlockBasedTable::open(options.clone(), self.table_options.clone(), file)?;
        Ok(Box::new(table))
    }
}

/// Factory for plain tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTableFactory {
    table_options: PlainTableOptions,
}

impl PlainTableFactory {
    /// A factory using `table_options` for every table.
    pub fn new(table_options: PlainTableOptions) -> Self {
        Self { table_options }
    }

    /// The options tables are built and opened with.
    pub fn table_options(&self) -> &PlainTableOptions {
        &self.table_options
    }
}

impl TableFactory for PlainTableFactory {
    fn name(&self) -> &str {
        "PlainTable"
    }

    fn new_builder(&self, options: &Options, writer: TableWriter) -> Result<Box<dyn TableBuilder>> {
        let builder = PlainTableBuilder::new(options.clone(), self.table_options, writer)?;
        Ok(Box::new(builder))
    }

    fn open_table(&self, options: &Options, file: Arc<dyn RandomAccessFile>) -> Result<Box<dyn TableReader>> {
        let table = PlainTableReader::open(options.clone(), self.table_options, file)?;
        Ok(Box::new(table))
    }
}

/// Write every entry of `iter` into a new table.
///
/// The iterator must yield keys in `options.comparator` order; a memtable
/// iterator yields internal keys, so pair it with an
/// [`InternalKeyComparator`](crate::memtable::InternalKeyComparator).
/// On any error the builder is abandoned. Returns the file size.
pub fn build_table(
    factory: &dyn TableFactory,
    options: &Options,
    iter: &mut dyn KvIterator,
    writer: TableWriter,
) -> Result<u64> {
    let mut builder = factory.new_builder(options, writer)?;

    iter.seek_to_first();
    while iter.valid() {
        if let Err(err) = builder.add(iter.key(), iter.value()) {
            builder.abandon();
            return Err(err);
        }
        iter.next();
    }
    if let Err(err) = iter.status() {
        builder.abandon();
        return Err(err);
    }

    let size = builder.finish()?;
    debug!("Built {} table: {} entries, {} bytes", factory.name(), builder.num_entries(), size);
    Ok(size)
}
