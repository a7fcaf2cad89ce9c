//! Block format implementation.
//!
//! A block contains sorted key-value entries and uses restart points
//! for efficient binary search and prefix compression.

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use log::warn;

use crate::coding::{decode_fixed32, decode_varint32, put_fixed32, put_varint32};
use crate::comparator::{shared_prefix_len, Comparator};
use crate::error::{Error, Result};
use crate::iterator::KvIterator;

/// Block stores key-value pairs with prefix compression.
///
/// Format:
/// ```text
/// [Entry 1]
/// [Entry 2]
/// ...
/// [Entry N]
/// [Restart Point 1: fixed32]
/// ...
/// [Restart Point M: fixed32]
/// [Num Restarts: fixed32]
/// ```
///
/// Each entry format:
/// ```text
/// [shared_key_len: varint32]   // Length of shared prefix with previous key
/// [unshared_key_len: varint32] // Length of unshared key suffix
/// [value_len: varint32]        // Length of value
/// [unshared_key: bytes]        // Key suffix
/// [value: bytes]               // Value data
/// ```
///
/// Entries at restart points store their full key (`shared_key_len == 0`).
#[derive(Debug, Clone)]
pub struct Block {
    data: Bytes,
    restart_offset: usize,
    num_restarts: u32,
}

impl Block {
    /// Create a new Block from its contents, validating the restart array.
    pub fn new(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("Block too small"));
        }

        let num_restarts = decode_fixed32(&data, data.len() - 4);
        let max_restarts = (data.len() - 4) / 4;
        if num_restarts as usize > max_restarts {
            return Err(Error::corruption(format!(
                "Block restart count {} exceeds block size {}",
                num_restarts,
                data.len()
            )));
        }
        let restart_offset = data.len() - 4 - num_restarts as usize * 4;

        Ok(Self { data, restart_offset, num_restarts })
    }

    /// Get the number of restart points
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// Size of the block contents in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get the raw data
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    fn restart_point(&self, index: u32) -> usize {
        decode_fixed32(&self.data, self.restart_offset + index as usize * 4) as usize
    }

    /// Create an iterator over the block ordered by `cmp`
    pub fn iter(&self, cmp: Arc<dyn Comparator>) -> BlockIterator {
        BlockIterator {
            block: self.clone(),
            cmp,
            current: self.restart_offset,
            restart_index: self.num_restarts,
            key: Vec::new(),
            value_start: self.restart_offset,
            value_end: self.restart_offset,
            error: None,
        }
    }
}

/// Decoded entry header: (shared, unshared, value_len, header_len).
fn decode_entry_header(data: &[u8]) -> Option<(usize, usize, usize, usize)> {
    let (shared, n1) = decode_varint32(data)?;
    let (unshared, n2) = decode_varint32(&data[n1..])?;
    let (value_len, n3) = decode_varint32(&data[n1 + n2..])?;
    let header_len = n1 + n2 + n3;

    let (shared, unshared, value_len) = (shared as usize, unshared as usize, value_len as usize);
    if data.len() - header_len < unshared + value_len {
        return None;
    }
    Some((shared, unshared, value_len, header_len))
}

/// BlockBuilder builds a block with prefix compression.
///
/// Keys must be added in strictly increasing order; the table builder
/// checks this against its comparator.
#[derive(Debug)]
pub struct BlockBuilder {
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize,
    last_key: Vec<u8>,
    restart_interval: usize,
}

impl BlockBuilder {
    /// Create a new BlockBuilder
    pub fn new(restart_interval: usize) -> Self {
        Self {
            buffer: Vec::new(),
            // First restart point at offset 0
            restarts: vec![0],
            counter: 0,
            last_key: Vec::new(),
            restart_interval: restart_interval.max(1),
        }
    }

    /// Add a key-value pair to the block
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        let mut shared = 0;
        if self.counter >= self.restart_interval {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        } else {
            shared = shared_prefix_len(&self.last_key, key);
        }
        let unshared = key.len() - shared;

        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, unshared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        self.counter += 1;
    }

    /// Append the restart array and return the block contents.
    ///
    /// The builder is reset and can start a new block.
    pub fn finish(&mut self) -> Bytes {
        for &restart in &self.restarts {
            put_fixed32(&mut self.buffer, restart);
        }
        put_fixed32(&mut self.buffer, self.restarts.len() as u32);

        let contents = Bytes::from(std::mem::take(&mut self.buffer));
        self.reset();
        contents
    }

    /// Discard the entries added so far
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.last_key.clear();
    }

    /// Size of the block if it were finished now
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    /// Check if the block is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.counter == 0
    }

    /// The last key added
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }
}

/// Iterator over entries in a block.
///
/// `current == restart_offset` marks the iterator as not positioned.
pub struct BlockIterator {
    block: Block,
    cmp: Arc<dyn Comparator>,
    /// Offset of the current entry
    current: usize,
    /// Restart block containing `current`
    restart_index: u32,
    key: Vec<u8>,
    value_start: usize,
    value_end: usize,
    error: Option<Error>,
}

impl BlockIterator {
    fn restarts(&self) -> usize {
        self.block.restart_offset
    }

    fn next_entry_offset(&self) -> usize {
        self.value_end
    }

    fn invalidate(&mut self) {
        self.current = self.restarts();
        self.restart_index = self.block.num_restarts;
        self.key.clear();
        self.value_start = self.current;
        self.value_end = self.current;
    }

    fn corrupted(&mut self, msg: &str) {
        warn!("Corrupted block entry: {}", msg);
        self.invalidate();
        if self.error.is_none() {
            self.error = Some(Error::corruption(msg.to_string()));
        }
    }

    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.restart_index = index;
        let offset = self.block.restart_point(index);
        // The next parse starts at the restart point
        self.value_start = offset;
        self.value_end = offset;
    }

    /// Decodes the entry at `next_entry_offset()`. Returns false at the end.
    fn parse_next_key(&mut self) -> bool {
        self.current = self.next_entry_offset();
        let restarts = self.restarts();
        if self.current >= restarts {
            self.invalidate();
            return false;
        }

        let data = &self.block.data[self.current..restarts];
        let Some((shared, unshared, value_len, header_len)) = decode_entry_header(data) else {
            self.corrupted("bad entry in block");
            return false;
        };
        if self.key.len() < shared {
            self.corrupted("shared prefix longer than previous key");
            return false;
        }

        let key_start = self.current + header_len;
        self.key.truncate(shared);
        self.key.extend_from_slice(&self.block.data[key_start..key_start + unshared]);
        self.value_start = key_start + unshared;
        self.value_end = self.value_start + value_len;

        while self.restart_index + 1 < self.block.num_restarts
            && self.block.restart_point(self.restart_index + 1) < self.current
        {
            self.restart_index += 1;
        }
        true
    }

    /// Full key stored at restart point `index`.
    fn restart_key(&self, index: u32) -> Option<&[u8]> {
        let offset = self.block.restart_point(index);
        let data = self.block.data.get(offset..self.restarts())?;
        let (shared, unshared, _, header_len) = decode_entry_header(data)?;
        if shared != 0 {
            return None;
        }
        Some(&data[header_len..header_len + unshared])
    }
}

impl KvIterator for BlockIterator {
    fn valid(&self) -> bool {
        self.error.is_none() && self.current < self.restarts()
    }

    fn seek_to_first(&mut self) {
        if self.block.num_restarts == 0 {
            self.invalidate();
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_key();
    }

    fn seek_to_last(&mut self) {
        if self.block.num_restarts == 0 {
            self.invalidate();
            return;
        }
        self.seek_to_restart_point(self.block.num_restarts - 1);
        while self.parse_next_key() && self.next_entry_offset() < self.restarts() {}
    }

    fn seek(&mut self, target: &[u8]) {
        if self.block.num_restarts == 0 {
            self.invalidate();
            return;
        }

        // Last restart point whose key is < target
        let mut left = 0;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            let Some(mid_key) = self.restart_key(mid) else {
                self.corrupted("bad restart entry in block");
                return;
            };
            if self.cmp.compare(mid_key, target) == Ordering::Less {
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        self.seek_to_restart_point(left);
        while self.parse_next_key() {
            if self.cmp.compare(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    fn next(&mut self) {
        assert!(self.valid(), "next() on invalid block iterator");
        self.parse_next_key();
    }

    fn prev(&mut self) {
        assert!(self.valid(), "prev() on invalid block iterator");

        // Back up to a restart point before the current entry
        let original = self.current;
        while self.block.restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                self.invalidate();
                return;
            }
            self.restart_index -= 1;
        }

        self.seek_to_restart_point(self.restart_index);
        while self.parse_next_key() && self.next_entry_offset() < original {}
    }

    fn key(&self) -> &[u8] {
        assert!(self.valid(), "key() on invalid block iterator");
        &self.key
    }

    fn value(&self) -> &[u8] {
        assert!(self.valid(), "value() on invalid block iterator");
        &self.block.data[self.value_start..self.value_end]
    }

    fn status(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
