//! Block-based table reader.
//!
//! Reads data from a block-based table with block cache integration.
//! Index and filter blocks are either preloaded when the table is opened or,
//! with `cache_index_and_filter_blocks`, served through the block cache like
//! data blocks.

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};

use crate::cache::{CacheHandle, CacheKey};
use crate::coding::put_varint64;
use crate::comparator::{bytewise, Comparator};
use crate::config::{BlockBasedTableOptions, Options, ReadOptions};
use crate::env::RandomAccessFile;
use crate::error::{Error, Result};
use crate::iterator::{EmptyIterator, KvIterator};
use crate::sstable::block::Block;
use crate::sstable::filter_block::{filter_block_name, FilterBlockReader};
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::format::read_block;
use crate::sstable::index::IndexBlock;
use crate::sstable::properties::{TableProperties, PROPERTIES_BLOCK_NAME};
use crate::sstable::two_level::TwoLevelIterator;
use crate::sstable::{BLOCK_BASED_TABLE_MAGIC, FOOTER_SIZE};
use crate::statistics::{record_tick, Ticker};

/// Prefix of cache ids handed out by the cache rather than derived from a file.
const CACHE_ID_TAG: u8 = b'C';

#[derive(Debug, Clone, Copy)]
enum BlockKind {
    Index,
    Filter,
    Data,
}

impl BlockKind {
    fn hit_ticker(self) -> Ticker {
        match self {
            BlockKind::Index => Ticker::BlockCacheIndexHit,
            BlockKind::Filter => Ticker::BlockCacheFilterHit,
            BlockKind::Data => Ticker::BlockCacheDataHit,
        }
    }

    fn miss_ticker(self) -> Ticker {
        match self {
            BlockKind::Index => Ticker::BlockCacheIndexMiss,
            BlockKind::Filter => Ticker::BlockCacheFilterMiss,
            BlockKind::Data => Ticker::BlockCacheDataMiss,
        }
    }
}

enum IndexSource {
    Preloaded(IndexBlock),
    Cached(BlockHandle),
}

enum FilterSource {
    Preloaded(FilterBlockReader),
    Cached(BlockHandle),
}

struct Rep {
    options: Options,
    table_options: BlockBasedTableOptions,
    file: Arc<dyn RandomAccessFile>,
    cache_id: Bytes,
    metaindex_handle: BlockHandle,
    index: IndexSource,
    filter: Option<FilterSource>,
    properties: Arc<TableProperties>,
}

/// A block-based table opened for reading.
///
/// Usage:
/// ```
/// use std::sync::Arc;
/// use tablestore::config::{BlockBasedTableOptions, Options, ReadOptions};
/// use tablestore::env::InMemoryFile;
/// use tablestore::sstable::{BlockBasedTable, BlockBasedTableBuilder};
///
/// let mut builder =
///     BlockBasedTableBuilder::new(Options::default(), BlockBasedTableOptions::default(), Vec::new()).unwrap();
/// builder.add(b"key1", b"value1").unwrap();
/// builder.finish().unwrap();
///
/// let file = Arc::new(InMemoryFile::new(builder.into_inner()));
/// let table = BlockBasedTable::open(Options::default(), BlockBasedTableOptions::default(), file).unwrap();
/// let (key, value) = table.get(&ReadOptions::default(), b"key1").unwrap().unwrap();
/// assert_eq!((key.as_slice(), value.as_slice()), (&b"key1"[..], &b"value1"[..]));
/// ```
#[derive(Clone)]
pub struct BlockBasedTable {
    rep: Arc<Rep>,
}

impl BlockBasedTable {
    /// Open the table stored in `file`.
    ///
    /// Keys are ordered by `options.comparator`, which must have the name the
    /// table was built with.
    pub fn open(
        options: Options,
        table_options: BlockBasedTableOptions,
        file: Arc<dyn RandomAccessFile>,
    ) -> Result<Self> {
        let size = file.size();
        if size < FOOTER_SIZE as u64 {
            return Err(Error::corruption("file is too short to be a table"));
        }

        let footer_data = file.read(size - FOOTER_SIZE as u64, FOOTER_SIZE)?;
        let footer = Footer::decode(&footer_data, BLOCK_BASED_TABLE_MAGIC)?;

        let metaindex = Block::new(read_block(file.as_ref(), &footer.metaindex_handle, true)?)?;
        let mut properties_handle = None;
        let mut filter_handle = None;
        let filter_name = table_options.filter_policy.as_deref().map(|policy| filter_block_name(policy));

        let mut iter = metaindex.iter(bytewise());
        iter.seek_to_first();
        while iter.valid() {
            let name = iter.key();
            if name == PROPERTIES_BLOCK_NAME.as_bytes() {
                properties_handle = Some(BlockHandle::decode(iter.value())?);
            } else if filter_name.as_deref().is_some_and(|n| n.as_bytes() == name) {
                filter_handle = Some(BlockHandle::decode(iter.value())?);
            }
            iter.next();
        }
        iter.status()?;

        let properties_handle =
            properties_handle.ok_or_else(|| Error::corruption("table has no properties block"))?;
        let properties_block = Block::new(read_block(file.as_ref(), &properties_handle, true)?)?;
        let properties = TableProperties::decode(&properties_block)?;

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

        let cache_id = match &table_options.block_cache {
            Some(cache) => match file.unique_id() {
                Some(id) => Bytes::from(id),
                None => {
                    let mut id = vec![CACHE_ID_TAG];
                    put_varint64(&mut id, cache.new_id());
                    Bytes::from(id)
                }
            },
            None => Bytes::new(),
        };

        let cache_managed = table_options.cache_index_and_filter_blocks && table_options.block_cache.is_some();
        let (index, filter) = if cache_managed {
            (IndexSource::Cached(footer.index_handle), filter_handle.map(FilterSource::Cached))
        } else {
            let index = IndexBlock::new(read_block(file.as_ref(), &footer.index_handle, true)?)?;
            let filter = match (filter_handle, &table_options.filter_policy) {
                (Some(handle), Some(policy)) => {
                    let data = read_block(file.as_ref(), &handle, true)?;
                    Some(FilterSource::Preloaded(FilterBlockReader::new(Arc::clone(policy), data)))
                }
                _ => None,
            };
            (IndexSource::Preloaded(index), filter)
        };

        let table = Self {
            rep: Arc::new(Rep {
                options,
                table_options,
                file,
                cache_id,
                metaindex_handle: footer.metaindex_handle,
                index,
                filter,
                properties: Arc::new(properties),
            }),
        };

        if cache_managed {
            // Warm the cache with the index
            table.rep.index_block(&ReadOptions::default())?;
        }

        debug!(
            "Opened table: {} bytes, {} entries, {} data blocks, index {}",
            size,
            table.rep.properties.num_entries,
            table.rep.properties.num_data_blocks,
            if cache_managed { "cached" } else { "preloaded" }
        );
        Ok(table)
    }

    /// Find the first entry `>= key` in the block that may hold `key`.
    ///
    /// Returns `None` when `key` is past the table or the filter rules the
    /// key out. The caller decides whether the returned key matches.
    pub fn get(&self, read_options: &ReadOptions, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let rep = &self.rep;
        let (index, _index_pin) = rep.index_block(read_options)?;
        let Some(handle) = index.find_block(rep.comparator(), key)? else {
            return Ok(None);
        };

        if let Some((filter, _filter_pin)) = rep.filter_block(read_options)? {
            if !filter.key_may_match(key) {
                record_tick(rep.options.statistics.as_deref(), Ticker::BloomFilterUseful);
                return Ok(None);
            }
        }

        let (block, _block_pin) = rep.data_block(&handle, read_options)?;
        let mut iter = block.iter(rep.comparator());
        iter.seek(key);
        if iter.valid() {
            return Ok(Some((iter.key().to_vec(), iter.value().to_vec())));
        }
        iter.status()?;
        Ok(None)
    }

    /// Iterator over the whole table.
    pub fn new_iterator(&self, read_options: &ReadOptions) -> Box<dyn KvIterator> {
        let (index, index_pin) = match self.rep.index_block(read_options) {
            Ok(index) => index,
            Err(err) => return Box::new(EmptyIterator::with_error(err)),
        };

        let index_iter = PinnedIterator::new(index.iter(self.rep.comparator()), index_pin);
        let rep = Arc::clone(&self.rep);
        let read_options = *read_options;
        Box::new(TwoLevelIterator::new(index_iter, move |value: &[u8]| -> Result<Box<dyn KvIterator>> {
            let handle = BlockHandle::decode(value)?;
            let (block, pin) = rep.data_block(&handle, &read_options)?;
            Ok(Box::new(PinnedIterator::new(block.iter(rep.comparator()), pin)))
        }))
    }

    /// Approximate file offset of the data for `key`.
    ///
    /// Keys past the last block map to the offset of the metaindex block,
    /// which is close to the size of the data.
    pub fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        let rep = &self.rep;
        let Ok((index, _pin)) = rep.index_block(&ReadOptions::default()) else {
            return rep.metaindex_handle.offset;
        };
        match index.find_block(rep.comparator(), key) {
            Ok(Some(handle)) => handle.offset,
            _ => rep.metaindex_handle.offset,
        }
    }

    /// Properties stored in the table.
    pub fn table_properties(&self) -> Arc<TableProperties> {
        Arc::clone(&self.rep.properties)
    }

    /// Whether the data block that may hold `key` is in the block cache.
    ///
    /// Does not change cache recency or statistics.
    pub fn is_key_in_cache(&self, read_options: &ReadOptions, key: &[u8]) -> Result<bool> {
        let rep = &self.rep;
        let Some(cache) = &rep.table_options.block_cache else {
            return Ok(false);
        };
        let (index, _pin) = rep.index_block(read_options)?;
        match index.find_block(rep.comparator(), key)? {
            Some(handle) => Ok(cache.contains(&CacheKey::new(rep.cache_id.clone(), handle.offset))),
            None => Ok(false),
        }
    }

    /// Whether the index was loaded when the table was opened.
    pub fn index_preloaded(&self) -> bool {
        matches!(self.rep.index, IndexSource::Preloaded(_))
    }

    /// Whether a filter was loaded when the table was opened.
    pub fn filter_preloaded(&self) -> bool {
        matches!(self.rep.filter, Some(FilterSource::Preloaded(_)))
    }
}

impl Rep {
    fn comparator(&self) -> Arc<dyn Comparator> {
        Arc::clone(&self.options.comparator)
    }

    /// Read a block through the block cache, if one is configured.
    fn fetch<T, D>(
        &self,
        handle: &BlockHandle,
        kind: BlockKind,
        read_options: &ReadOptions,
        decode: D,
    ) -> Result<(T, Option<CacheHandle>)>
    where
        T: Any + Send + Sync + Clone,
        D: FnOnce(Bytes) -> Result<(T, usize)>,
    {
        let Some(cache) = &self.table_options.block_cache else {
            let data = read_block(self.file.as_ref(), handle, read_options.verify_checksums)?;
            return decode(data).map(|(value, _)| (value, None));
        };

        let stats = self.options.statistics.as_deref();
        let key = CacheKey::new(self.cache_id.clone(), handle.offset);
        if let Some(cached) = cache.lookup(&key) {
            if let Some(value) = cached.value::<T>() {
                record_tick(stats, Ticker::BlockCacheHit);
                record_tick(stats, kind.hit_ticker());
                return Ok((value.clone(), Some(cached)));
            }
        }

        record_tick(stats, Ticker::BlockCacheMiss);
        record_tick(stats, kind.miss_ticker());
        let data = read_block(self.file.as_ref(), handle, read_options.verify_checksums)?;
        let (value, charge) = decode(data)?;
        if read_options.fill_cache {
            let pin = cache.insert(key, value.clone(), charge);
            return Ok((value, Some(pin)));
        }
        Ok((value, None))
    }

    fn index_block(&self, read_options: &ReadOptions) -> Result<(IndexBlock, Option<CacheHandle>)> {
        match &self.index {
            IndexSource::Preloaded(index) => Ok((index.clone(), None)),
            IndexSource::Cached(handle) => {
                let (block, pin) = self.fetch(handle, BlockKind::Index, read_options, decode_block)?;
                Ok((IndexBlock::from_block(block), pin))
            }
        }
    }

    fn filter_block(&self, read_options: &ReadOptions) -> Result<Option<(FilterBlockReader, Option<CacheHandle>)>> {
        let (Some(filter), Some(policy)) = (&self.filter, &self.table_options.filter_policy) else {
            return Ok(None);
        };
        match filter {
            FilterSource::Preloaded(reader) => Ok(Some((reader.clone(), None))),
            FilterSource::Cached(handle) => {
                let (data, pin) = self.fetch(handle, BlockKind::Filter, read_options, |data: Bytes| {
                    let charge = data.len();
                    Ok((data, charge))
                })?;
                Ok(Some((FilterBlockReader::new(Arc::clone(policy), data), pin)))
            }
        }
    }

    fn data_block(&self, handle: &BlockHandle, read_options: &ReadOptions) -> Result<(Block, Option<CacheHandle>)> {
        self.fetch(handle, BlockKind::Data, read_options, decode_block)
    }
}

fn decode_block(data: Bytes) -> Result<(Block, usize)> {
    let block = Block::new(data)?;
    let charge = block.size();
    Ok((block, charge))
}

/// Keeps a cache entry pinned for as long as an iterator over it lives.
struct PinnedIterator<I> {
    inner: I,
    _pin: Option<CacheHandle>,
}

impl<I: KvIterator> PinnedIterator<I> {
    fn new(inner: I, pin: Option<CacheHandle>) -> Self {
        Self { inner, _pin: pin }
    }
}

impl<I: KvIterator> KvIterator for PinnedIterator<I> {
    fn valid(&self) -> bool {
        self.inner.valid()
    }

    fn seek_to_first(&mut self) {
        self.inner.seek_to_first()
    }

    fn seek_to_last(&mut self) {
        self.inner.seek_to_last()
    }

    fn seek(&mut self, target: &[u8]) {
        self.inner.seek(target)
    }

    fn next(&mut self) {
        self.inner.next()
    }

    fn prev(&mut self) {
        self.inner.prev()
    }

    fn key(&self) -> &[u8] {
        self.inner.key()
    }

    fn value(&self) -> &[u8] {
        self.inner.value()
    }

    fn status(&self) -> Result<()> {
        self.inner.status()
    }
}
