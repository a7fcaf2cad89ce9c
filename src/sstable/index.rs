//! Index block implementation.
//!
//! The index block maps separator keys to data blocks. Each separator is
//! `>=` every key of its block and `<` the first key of the next block, so
//! the first index entry `>= key` names the only block that may hold `key`.

use std::sync::Arc;

use bytes::Bytes;

use crate::comparator::Comparator;
use crate::error::Result;
use crate::iterator::KvIterator;
use crate::sstable::block::{Block, BlockBuilder, BlockIterator};
use crate::sstable::footer::BlockHandle;

/// IndexEntry represents a single entry in the index block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Separator key of the data block
    pub key: Vec<u8>,
    /// Handle to the data block
    pub handle: BlockHandle,
}

impl IndexEntry {
    /// Create a new IndexEntry
    pub fn new(key: Vec<u8>, handle: BlockHandle) -> Self {
        Self { key, handle }
    }
}

/// Builds an index block. Every entry is a restart point.
#[derive(Debug)]
pub struct IndexBuilder {
    block: BlockBuilder,
    num_entries: usize,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexBuilder {
    /// Create a new IndexBuilder
    pub fn new() -> Self {
        Self { block: BlockBuilder::new(1), num_entries: 0 }
    }

    /// Add an entry mapping `separator` to `handle`
    pub fn add_entry(&mut self, separator: &[u8], handle: &BlockHandle) {
        self.block.add(separator, &handle.encode());
        self.num_entries += 1;
    }

    /// Number of entries added
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// Estimated encoded size
    pub fn current_size_estimate(&self) -> usize {
        self.block.current_size_estimate()
    }

    /// Finish building and return the block contents
    pub fn finish(&mut self) -> Bytes {
        self.num_entries = 0;
        self.block.finish()
    }
}

/// IndexBlock locates data blocks by key.
#[derive(Debug, Clone)]
pub struct IndexBlock {
    block: Block,
}

impl IndexBlock {
    /// Create a new IndexBlock from its contents
    pub fn new(data: Bytes) -> Result<Self> {
        Ok(Self { block: Block::new(data)? })
    }

    /// Wrap an already decoded block
    pub fn from_block(block: Block) -> Self {
        Self { block }
    }

    /// Handle of the first data block whose separator is `>= key`.
    ///
    /// Returns `None` when `key` is past every block.
    pub fn find_block(&self, cmp: Arc<dyn Comparator>, key: &[u8]) -> Result<Option<BlockHandle>> {
        let mut iter = self.block.iter(cmp);
        iter.seek(key);
        if !iter.valid() {
            iter.status()?;
            return Ok(None);
        }
        BlockHandle::decode(iter.value()).map(Some)
    }

    /// Iterator over the index entries; values are encoded block handles
    pub fn iter(&self, cmp: Arc<dyn Comparator>) -> BlockIterator {
        self.block.iter(cmp)
    }

    /// Decode every entry, in order
    pub fn entries(&self, cmp: Arc<dyn Comparator>) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::new();
        let mut iter = self.block.iter(cmp);
        iter.seek_to_first();
        while iter.valid() {
            entries.push(IndexEntry::new(iter.key().to_vec(), BlockHandle::decode(iter.value())?));
            iter.next();
        }
        iter.status()?;
        Ok(entries)
    }

    /// Size of the index block in bytes
    pub fn size(&self) -> usize {
        self.block.size()
    }

    /// The underlying block
    pub fn block(&self) -> &Block {
        &self.block
    }
}
