//! The index region of a plain table.
//!
//! Total-order format:
//! ```text
//! [index_type: u8][count: fixed32][record_offset: fixed32] x count
//! ```
//!
//! Hash format:
//! ```text
//! [index_type: u8][num_prefixes: fixed32][num_buckets: fixed32]
//! [bloom_len: fixed32][bloom: bytes]
//! [bucket_start: fixed32] x (num_buckets + 1)
//! [prefix_len: varint32][prefix][first_record_offset: varint32] x num_prefixes
//! ```
//!
//! Hash entries are grouped by bucket; `bucket_start[b]..bucket_start[b + 1]`
//! delimits the entries of bucket `b`, relative to the first entry.

use bytes::Bytes;

use crate::coding::{decode_fixed32, decode_varint32, put_fixed32, put_varint32};
use crate::config::PlainTableIndexType;
use crate::error::{Error, Result};
use crate::filter::BloomFilter;

fn bucket_of(prefix: &[u8], num_buckets: u32) -> u32 {
    crc32fast::hash(prefix) % num_buckets
}

/// Builds the sorted record offsets of a total-order index.
#[derive(Debug, Default)]
pub struct TotalOrderIndexBuilder {
    offsets: Vec<u32>,
}

impl TotalOrderIndexBuilder {
    /// Records the start of the next record.
    pub fn add_record(&mut self, offset: u32) {
        self.offsets.push(offset);
    }

    /// Encodes the index region.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5 + self.offsets.len() * 4);
        buf.push(PlainTableIndexType::TotalOrder as u8);
        put_fixed32(&mut buf, self.offsets.len() as u32);
        for &offset in &self.offsets {
            put_fixed32(&mut buf, offset);
        }
        self.offsets.clear();
        buf
    }
}

/// Builds the prefix hash index over contiguous prefix groups.
#[derive(Debug)]
pub struct HashIndexBuilder {
    index_type: PlainTableIndexType,
    groups: Vec<(Vec<u8>, u32)>,
}

impl HashIndexBuilder {
    /// Creates a builder for one of the hash index types.
    pub fn new(index_type: PlainTableIndexType) -> Self {
        debug_assert!(index_type.is_hash());
        Self { index_type, groups: Vec::new() }
    }

    /// Records a record with `prefix` at `offset`.
    ///
    /// Records sharing a prefix are expected to be adjacent; only the first
    /// record of a group is indexed.
    pub fn add_record(&mut self, prefix: &[u8], offset: u32) {
        match self.groups.last() {
            Some((last, _)) if last.as_slice() == prefix => {}
            _ => self.groups.push((prefix.to_vec(), offset)),
        }
    }

    /// Number of prefix groups seen.
    pub fn num_prefixes(&self) -> usize {
        self.groups.len()
    }

    /// Encodes the index region. Returns the region and the bloom size.
    pub fn finish(&mut self, hash_table_ratio: f64, bloom_bits_per_prefix: u32) -> (Vec<u8>, usize) {
        let num_prefixes = self.groups.len();
        let num_buckets = ((num_prefixes as f64 / hash_table_ratio).ceil() as u32).max(1);

        let bloom = if bloom_bits_per_prefix > 0 && num_prefixes > 0 {
            let mut filter = BloomFilter::with_bits_per_key(num_prefixes, bloom_bits_per_prefix as usize);
            for (prefix, _) in &self.groups {
                filter.add(prefix);
            }
            filter.encode()
        } else {
            Vec::new()
        };

        let mut buckets: Vec<Vec<u8>> = vec![Vec::new(); num_buckets as usize];
        for (prefix, offset) in &self.groups {
            let bucket = &mut buckets[bucket_of(prefix, num_buckets) as usize];
            put_varint32(bucket, prefix.len() as u32);
            bucket.extend_from_slice(prefix);
            put_varint32(bucket, *offset);
        }

        let mut buf = Vec::new();
        buf.push(self.index_type as u8);
        put_fixed32(&mut buf, num_prefixes as u32);
        put_fixed32(&mut buf, num_buckets);
        put_fixed32(&mut buf, bloom.len() as u32);
        buf.extend_from_slice(&bloom);

        let mut start = 0u32;
        put_fixed32(&mut buf, start);
        for bucket in &buckets {
            start += bucket.len() as u32;
            put_fixed32(&mut buf, start);
        }
        for bucket in &buckets {
            buf.extend_from_slice(bucket);
        }

        self.groups.clear();
        (buf, bloom.len())
    }
}

/// A decoded index region.
#[derive(Debug, Clone)]
pub enum PlainIndex {
    /// Record offsets in key order.
    TotalOrder {
        /// The encoded offsets, fixed32 each
        offsets: Bytes,
    },
    /// Prefix hash buckets.
    Hash {
        /// Which hash index this is
        index_type: PlainTableIndexType,
        /// Number of buckets
        num_buckets: u32,
        /// Encoded bloom filter over prefixes, empty without one
        bloom: Bytes,
        /// `num_buckets + 1` fixed32 bucket boundaries
        bucket_starts: Bytes,
        /// Bucket entries
        entries: Bytes,
    },
}

impl PlainIndex {
    /// Decodes an index region.
    pub fn decode(data: Bytes) -> Result<Self> {
        let bad = || Error::corruption("bad plain table index");
        let index_type = data.first().copied().and_then(PlainTableIndexType::from_u8).ok_or_else(bad)?;

        if index_type == PlainTableIndexType::TotalOrder {
            if data.len() < 5 {
                return Err(bad());
            }
            let count = decode_fixed32(&data, 1) as usize;
            if data.len() != 5 + count * 4 {
                return Err(bad());
            }
            return Ok(PlainIndex::TotalOrder { offsets: data.slice(5..) });
        }

        if data.len() < 13 {
            return Err(bad());
        }
        let num_buckets = decode_fixed32(&data, 5);
        let bloom_len = decode_fixed32(&data, 9) as usize;
        let bloom_end = 13 + bloom_len;
        let starts_end = bloom_end + (num_buckets as usize + 1) * 4;
        if num_buckets == 0 || data.len() < starts_end {
            return Err(bad());
        }
        let bucket_starts = data.slice(bloom_end..starts_end);
        let entries = data.slice(starts_end..);
        if decode_fixed32(&bucket_starts, num_buckets as usize * 4) as usize != entries.len() {
            return Err(bad());
        }

        Ok(PlainIndex::Hash { index_type, num_buckets, bloom: data.slice(13..bloom_end), bucket_starts, entries })
    }

    /// Number of records in a total-order index.
    pub fn num_records(&self) -> usize {
        match self {
            PlainIndex::TotalOrder { offsets } => offsets.len() / 4,
            PlainIndex::Hash { .. } => 0,
        }
    }

    /// Offset of the `i`-th record of a total-order index.
    ///
    /// `None` past the last record and for hash indexes, which keep no
    /// per-record offsets.
    pub fn record_offset(&self, i: usize) -> Option<usize> {
        match self {
            PlainIndex::TotalOrder { offsets } if i < offsets.len() / 4 => {
                Some(decode_fixed32(offsets, i * 4) as usize)
            }
            _ => None,
        }
    }

    /// Whether the prefix bloom admits `prefix`.
    pub fn prefix_may_match(&self, prefix: &[u8]) -> bool {
        match self {
            PlainIndex::Hash { bloom, .. } if !bloom.is_empty() => BloomFilter::encoded_may_contain(bloom, prefix),
            _ => true,
        }
    }

    /// Offset of the first record of the `prefix` group.
    pub fn find_prefix(&self, prefix: &[u8]) -> Result<Option<usize>> {
        let PlainIndex::Hash { num_buckets, bucket_starts, entries, .. } = self else {
            return Err(Error::invalid_state("prefix lookup on a total-order index"));
        };

        let bucket = bucket_of(prefix, *num_buckets) as usize;
        let start = decode_fixed32(bucket_starts, bucket * 4) as usize;
        let end = decode_fixed32(bucket_starts, (bucket + 1) * 4) as usize;
        let bad = || Error::corruption("bad plain table hash bucket");
        let mut input = entries.get(start..end).ok_or_else(bad)?;

        while !input.is_empty() {
            let (len, n) = decode_varint32(input).ok_or_else(bad)?;
            input = &input[n..];
            let candidate = input.get(..len as usize).ok_or_else(bad)?;
            input = &input[len as usize..];
            let (offset, n) = decode_varint32(input).ok_or_else(bad)?;
            input = &input[n..];
            if candidate == prefix {
                return Ok(Some(offset as usize));
            }
        }
        Ok(None)
    }
}
