//! Bloom Filter implementation.
//!
//! A space-efficient probabilistic data structure used to test whether an element
//! is a member of a set. False positive matches are possible, but false negatives are not.

use std::hash::Hasher;

use crate::error::{Error, Result};
use crate::filter::FilterPolicy;

/// Default bits per key for bloom filter
pub const DEFAULT_BITS_PER_KEY: usize = 10;

/// Encoded header: [num_hashes: 4 bytes][num_bits: 8 bytes]
const HEADER_SIZE: usize = 12;

/// BloomFilter provides probabilistic set membership testing.
///
/// # Example
/// ```
/// use tablestore::filter::BloomFilter;
///
/// let mut filter = BloomFilter::with_bits_per_key(1000, 10);
/// filter.add(b"key1");
/// filter.add(b"key2");
///
/// assert!(filter.may_contain(b"key1"));
/// assert!(filter.may_contain(b"key2"));
/// // key3 might return true (false positive) or false
/// ```
#[derive(Debug, Clone)]
pub struct BloomFilter {
    /// Bit array for the bloom filter
    bits: Vec<u8>,
    /// Number of hash functions to use
    num_hashes: u32,
    /// Number of bits in the filter
    num_bits: usize,
}

impl BloomFilter {
    /// Create a BloomFilter sized for `num_keys` keys at `bits_per_key` bits each.
    pub fn with_bits_per_key(num_keys: usize, bits_per_key: usize) -> Self {
        let num_bits = (num_keys * bits_per_key).max(64);
        // ln(2) * bits per key minimises the false positive rate
        let num_hashes = ((bits_per_key as f64) * 0.69).round() as u32;

        Self::with_bits_and_hashes(num_bits, num_hashes.clamp(1, 30))
    }

    fn with_bits_and_hashes(num_bits: usize, num_hashes: u32) -> Self {
        Self { bits: vec![0u8; num_bits.div_ceil(8)], num_hashes, num_bits }
    }

    /// Add a key to the filter.
    pub fn add(&mut self, key: &[u8]) {
        for pos in probe_positions(key, self.num_hashes, self.num_bits) {
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
    }

    /// Check if a key may exist in the set.
    ///
    /// Returns `false` only if the key was definitely never added.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        bits_match(&self.bits, key, self.num_hashes, self.num_bits)
    }

    /// Encode the filter to bytes for storage.
    ///
    /// Format:
    /// [num_hashes: 4 bytes][num_bits: 8 bytes][bits: variable]
    pub fn encode(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(HEADER_SIZE + self.bits.len());
        encoded.extend_from_slice(&self.num_hashes.to_le_bytes());
        encoded.extend_from_slice(&(self.num_bits as u64).to_le_bytes());
        encoded.extend_from_slice(&self.bits);
        encoded
    }

    /// Decode a filter from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (num_hashes, num_bits, bits) = parse(data)?;
        Ok(Self { bits: bits.to_vec(), num_hashes, num_bits })
    }

    /// Probe an encoded filter without copying it.
    ///
    /// A filter that fails to parse matches every key.
    pub fn encoded_may_contain(data: &[u8], key: &[u8]) -> bool {
        match parse(data) {
            Ok((num_hashes, num_bits, bits)) => bits_match(bits, key, num_hashes, num_bits),
            Err(_) => true,
        }
    }

    /// Get the size of the filter in bytes.
    pub fn size(&self) -> usize {
        self.bits.len()
    }

    /// Get the number of hash functions used.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Get the number of bits in the filter.
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }
}

fn parse(data: &[u8]) -> Result<(u32, usize, &[u8])> {
    if data.len() < HEADER_SIZE {
        return Err(Error::corruption("Bloom filter data too short"));
    }

    let num_hashes = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let mut num_bits_bytes = [0u8; 8];
    num_bits_bytes.copy_from_slice(&data[4..HEADER_SIZE]);
    let num_bits = u64::from_le_bytes(num_bits_bytes) as usize;

    let bits = &data[HEADER_SIZE..];
    if num_bits == 0 || bits.len() != num_bits.div_ceil(8) {
        return Err(Error::corruption("Bloom filter size mismatch"));
    }
    Ok((num_hashes, num_bits, bits))
}

fn bits_match(bits: &[u8], key: &[u8], num_hashes: u32, num_bits: usize) -> bool {
    probe_positions(key, num_hashes, num_bits).all(|pos| bits[pos / 8] & (1 << (pos % 8)) != 0)
}

/// Bit positions for `key` by double hashing: h_i = h1 + i * h2 (mod m).
fn probe_positions(key: &[u8], num_hashes: u32, num_bits: usize) -> impl Iterator<Item = usize> {
    let h1 = hash_with_seed(key, 0xbc9f1d34);
    let h2 = hash_with_seed(key, 0xd0e89c7b);
    (0..num_hashes).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) as usize) % num_bits)
}

fn hash_with_seed(key: &[u8], seed: u32) -> u32 {
    let mut hasher = FnvHasher::new_with_seed(seed);
    hasher.write(key);
    hasher.finish() as u32
}

/// Simple FNV-1a hasher for Bloom Filter
struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    fn new_with_seed(seed: u32) -> Self {
        Self { state: Self::FNV_OFFSET_BASIS ^ (seed as u64) }
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::FNV_PRIME);
        }
    }
}

/// [`FilterPolicy`] producing one bloom filter per table.
#[derive(Debug, Clone, Copy)]
pub struct BloomFilterPolicy {
    bits_per_key: usize,
}

impl BloomFilterPolicy {
    /// Name persisted in the metaindex as `filter.<name>`.
    pub const NAME: &'static str = "tablestore.BuiltinBloomFilter";

    /// Creates a policy using `bits_per_key` bits for every key.
    pub fn new(bits_per_key: usize) -> Self {
        Self { bits_per_key: bits_per_key.max(1) }
    }
}

impl Default for BloomFilterPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BITS_PER_KEY)
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8> {
        let mut filter = BloomFilter::with_bits_per_key(keys.len(), self.bits_per_key);
        for key in keys {
            filter.add(key);
        }
        filter.encode()
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        BloomFilter::encoded_may_contain(filter, key)
    }
}
