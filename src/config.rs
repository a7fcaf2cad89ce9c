//! Configuration options for building and reading tables.
//!
//! [`Options`] carries the settings shared by every table format and the
//! memtable. Format-specific knobs live in [`BlockBasedTableOptions`] and
//! [`PlainTableOptions`], which are handed to the matching table factory.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::BlockCache;
use crate::comparator::{bytewise, Comparator};
use crate::filter::FilterPolicy;
use crate::memtable::{MemTableRepFactory, SkipListFactory};
use crate::slice_transform::SliceTransform;
use crate::sstable::flush_policy::{FlushBlockBySizePolicyFactory, FlushBlockPolicyFactory};
use crate::sstable::properties::TablePropertiesCollectorFactory;
use crate::statistics::Statistics;
use crate::{Error, Result};

/// Options shared by table builders, table readers and memtables.
#[derive(Clone)]
pub struct Options {
    /// Order of the keys stored in tables.
    ///
    /// Tables holding internal keys must use an
    /// [`InternalKeyComparator`](crate::InternalKeyComparator) here.
    /// Default: [`BytewiseComparator`](crate::BytewiseComparator)
    pub comparator: Arc<dyn Comparator>,

    /// Codec applied to blocks.
    /// Default: CompressionType::Snappy when the `snappy` feature is enabled
    pub compression: CompressionType,

    /// Codec-specific compression level; 0 selects the codec default.
    /// Default: 0
    pub compression_level: i32,

    /// Ticker sink for cache accounting.
    /// Default: None
    pub statistics: Option<Arc<Statistics>>,

    /// Extracts the prefix used by prefix-hashed plain tables.
    /// Default: None
    pub prefix_extractor: Option<Arc<dyn SliceTransform>>,

    /// Factories for user property collectors run by every table builder.
    pub table_properties_collectors: Vec<Arc<dyn TablePropertiesCollectorFactory>>,

    /// Representation backing new memtables.
    /// Default: skip list
    pub memtable_factory: Arc<dyn MemTableRepFactory>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparator: bytewise(),
            compression: CompressionType::default(),
            compression_level: 0,
            statistics: None,
            prefix_extractor: None,
            table_properties_collectors: Vec::new(),
            memtable_factory: Arc::new(SkipListFactory),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("comparator", &self.comparator.name())
            .field("compression", &self.compression)
            .field("compression_level", &self.compression_level)
            .field("statistics", &self.statistics.is_some())
            .field("prefix_extractor", &self.prefix_extractor.as_ref().map(|p| p.name().to_string()))
            .field("table_properties_collectors", &self.table_properties_collectors.len())
            .field("memtable_factory", &self.memtable_factory.name())
            .finish()
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key comparator.
    pub fn comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Sets the compression algorithm.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the compression level.
    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Attaches a statistics sink.
    pub fn statistics(mut self, statistics: Arc<Statistics>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Sets the prefix extractor.
    pub fn prefix_extractor(mut self, extractor: Arc<dyn SliceTransform>) -> Self {
        self.prefix_extractor = Some(extractor);
        self
    }

    /// Adds a user property collector factory.
    pub fn add_collector(mut self, factory: Arc<dyn TablePropertiesCollectorFactory>) -> Self {
        self.table_properties_collectors.push(factory);
        self
    }

    /// Sets the memtable representation factory.
    pub fn memtable_factory(mut self, factory: Arc<dyn MemTableRepFactory>) -> Self {
        self.memtable_factory = factory;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.comparator.name().is_empty() {
            return Err(Error::invalid_argument("comparator name must not be empty"));
        }
        Ok(())
    }
}

/// Options of the block-based table format.
#[derive(Clone)]
pub struct BlockBasedTableOptions {
    /// Approximate uncompressed size of a data block (in bytes).
    /// Default: 4KB
    pub block_size: usize,

    /// Number of entries between restart points.
    /// Default: 16
    pub block_restart_interval: usize,

    /// Shared cache for data blocks and, optionally, index and filter blocks.
    /// Default: None
    pub block_cache: Option<Arc<BlockCache>>,

    /// Filter built over every key of a table.
    /// Default: None
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    /// Serve index and filter blocks through the block cache instead of
    /// holding them in the reader. Requires a block cache.
    /// Default: false
    pub cache_index_and_filter_blocks: bool,

    /// Decides when the builder closes a data block.
    /// Default: flush by size
    pub flush_block_policy_factory: Arc<dyn FlushBlockPolicyFactory>,
}

impl Default for BlockBasedTableOptions {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024,
            block_restart_interval: 16,
            block_cache: None,
            filter_policy: None,
            cache_index_and_filter_blocks: false,
            flush_block_policy_factory: Arc::new(FlushBlockBySizePolicyFactory),
        }
    }
}

impl fmt::Debug for BlockBasedTableOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockBasedTableOptions")
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("block_cache", &self.block_cache.as_ref().map(|c| c.capacity()))
            .field("filter_policy", &self.filter_policy.as_ref().map(|p| p.name().to_string()))
            .field("cache_index_and_filter_blocks", &self.cache_index_and_filter_blocks)
            .field("flush_block_policy_factory", &self.flush_block_policy_factory.name())
            .finish()
    }
}

impl BlockBasedTableOptions {
    /// Creates table options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the restart interval.
    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.block_restart_interval = interval;
        self
    }

    /// Sets the block cache.
    pub fn block_cache(mut self, cache: Arc<BlockCache>) -> Self {
        self.block_cache = Some(cache);
        self
    }

    /// Sets the filter policy.
    pub fn filter_policy(mut self, policy: Arc<dyn FilterPolicy>) -> Self {
        self.filter_policy = Some(policy);
        self
    }

    /// Routes index and filter blocks through the block cache.
    pub fn cache_index_and_filter_blocks(mut self, value: bool) -> Self {
        self.cache_index_and_filter_blocks = value;
        self
    }

    /// Sets the flush block policy factory.
    pub fn flush_block_policy_factory(mut self, factory: Arc<dyn FlushBlockPolicyFactory>) -> Self {
        self.flush_block_policy_factory = factory;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::invalid_argument("block_size must be > 0"));
        }
        if self.block_restart_interval == 0 {
            return Err(Error::invalid_argument("block_restart_interval must be > 0"));
        }
        Ok(())
    }
}

/// Index layout of a plain table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlainTableIndexType {
    /// Hash over a fixed-length key prefix; requires a fixed prefix extractor.
    HashFixedPrefix = 0,
    /// Hash over the whole extracted prefix, of any length.
    HashFullPrefix = 1,
    /// Sorted record offsets supporting full seeks and backward iteration.
    TotalOrder = 2,
}

impl PlainTableIndexType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PlainTableIndexType::HashFixedPrefix),
            1 => Some(PlainTableIndexType::HashFullPrefix),
            2 => Some(PlainTableIndexType::TotalOrder),
            _ => None,
        }
    }

    /// Whether the index is a prefix hash.
    pub fn is_hash(self) -> bool {
        !matches!(self, PlainTableIndexType::TotalOrder)
    }
}

/// Options of the plain table format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlainTableOptions {
    /// Length of every user key, or 0 for variable-length keys.
    /// Default: 0
    pub user_key_len: u32,

    /// Bits per prefix of the prefix bloom; 0 disables it.
    /// Default: 10
    pub bloom_bits_per_prefix: u32,

    /// Prefixes per hash bucket.
    /// Default: 0.75
    pub hash_table_ratio: f64,

    /// Index layout.
    /// Default: PlainTableIndexType::TotalOrder
    pub index_type: PlainTableIndexType,
}

impl Default for PlainTableOptions {
    fn default() -> Self {
        Self {
            user_key_len: 0,
            bloom_bits_per_prefix: 10,
            hash_table_ratio: 0.75,
            index_type: PlainTableIndexType::TotalOrder,
        }
    }
}

impl PlainTableOptions {
    /// Creates plain table options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fixed user key length (0 = variable).
    pub fn user_key_len(mut self, len: u32) -> Self {
        self.user_key_len = len;
        self
    }

    /// Sets the prefix bloom density.
    pub fn bloom_bits_per_prefix(mut self, bits: u32) -> Self {
        self.bloom_bits_per_prefix = bits;
        self
    }

    /// Sets the hash table ratio.
    pub fn hash_table_ratio(mut self, ratio: f64) -> Self {
        self.hash_table_ratio = ratio;
        self
    }

    /// Sets the index layout.
    pub fn index_type(mut self, index_type: PlainTableIndexType) -> Self {
        self.index_type = index_type;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.index_type.is_hash() && !(self.hash_table_ratio > 0.0 && self.hash_table_ratio <= 1.0) {
            return Err(Error::invalid_argument("hash_table_ratio must be in (0, 1]"));
        }
        Ok(())
    }
}

/// Per-read options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Verify block checksums before decoding.
    /// Default: true
    pub verify_checksums: bool,

    /// Insert blocks read from the file into the block cache.
    /// Default: true
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { verify_checksums: true, fill_cache: true }
    }
}

impl ReadOptions {
    /// Creates read options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets checksum verification.
    pub fn verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// Sets whether reads populate the block cache.
    pub fn fill_cache(mut self, value: bool) -> Self {
        self.fill_cache = value;
        self
    }
}

/// Compression algorithms applied to blocks.
///
/// The discriminant is the codec id persisted in every block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio).
    #[cfg(feature = "snappy")]
    Snappy = 1,

    /// LZ4 compression (very fast, lower compression ratio).
    #[cfg(feature = "lz4-compression")]
    Lz4 = 2,
}

impl CompressionType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            #[cfg(feature = "snappy")]
            1 => Some(CompressionType::Snappy),
            #[cfg(feature = "lz4-compression")]
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}
