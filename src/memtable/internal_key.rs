//! # Internal Key Format
//!
//! Internal keys layer a sequence number and an operation kind onto a user
//! key. They are what memtables and tables actually store.
//!
//! ## Format
//!
//! ```text
//! InternalKey:
//!   [user_key: bytes] [tag: fixed64 little-endian]
//!
//! tag = (sequence << 8) | value_type
//! ```
//!
//! ## Ordering
//!
//! InternalKeys are ordered by:
//! 1. user_key (ascending, under the user comparator)
//! 2. tag (descending): newer sequence numbers first, and for the same
//!    sequence, Value before Deletion

use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::{BytewiseComparator, Comparator};
use crate::error::{Error, Result};

/// Size in bytes of the packed sequence/type trailer.
pub const TAG_SIZE: usize = 8;

/// Largest sequence number that fits into the 56-bit tag field.
pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 56) - 1;

/// The type of a value in the database.
///
/// - `Value`: A normal key-value pair
/// - `Deletion`: A tombstone marking that a key has been deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    /// A tombstone indicating the key has been deleted
    Deletion = 0,

    /// A normal value
    Value = 1,
}

/// Type used when building a key to seek to: the highest type sorts first.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

impl ValueType {
    /// Converts a u8 to a ValueType.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ValueType::Deletion),
            1 => Some(ValueType::Value),
            _ => None,
        }
    }

    /// Converts the ValueType to a u8.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Packs a sequence number and a value type into the 8-byte tag.
///
/// # Panics
///
/// Panics if `sequence` exceeds [`MAX_SEQUENCE_NUMBER`]; the top byte would
/// otherwise be dropped and the entry would sort as a much older version.
pub fn pack_tag(sequence: u64, value_type: ValueType) -> u64 {
    assert!(
        sequence <= MAX_SEQUENCE_NUMBER,
        "sequence number {} exceeds the maximum {}",
        sequence,
        MAX_SEQUENCE_NUMBER
    );
    (sequence << 8) | value_type.as_u8() as u64
}

/// Appends the encoding of `(user_key, sequence, value_type)` to `buf`.
pub fn append_internal_key(
    buf: &mut Vec<u8>,
    user_key: &[u8],
    sequence: u64,
    value_type: ValueType,
) {
    buf.reserve(user_key.len() + TAG_SIZE);
    buf.extend_from_slice(user_key);
    buf.extend_from_slice(&pack_tag(sequence, value_type).to_le_bytes());
}

/// Builds the internal key that sorts before every version of `user_key`
/// visible at `sequence`.
pub fn lookup_key(user_key: &[u8], sequence: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(user_key.len() + TAG_SIZE);
    append_internal_key(&mut buf, user_key, sequence, VALUE_TYPE_FOR_SEEK);
    buf
}

/// Returns the user key portion of an encoded internal key.
///
/// Keys shorter than the tag are returned unchanged.
pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    if internal_key.len() < TAG_SIZE {
        return internal_key;
    }
    &internal_key[..internal_key.len() - TAG_SIZE]
}

fn extract_tag(internal_key: &[u8]) -> u64 {
    if internal_key.len() < TAG_SIZE {
        return 0;
    }
    let start = internal_key.len() - TAG_SIZE;
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&internal_key[start..]);
    u64::from_le_bytes(tag)
}

/// A borrowed, decoded view of an internal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    /// The user key.
    pub user_key: &'a [u8],
    /// The sequence number.
    pub sequence: u64,
    /// The value type.
    pub value_type: ValueType,
}

/// Decodes an internal key without copying the user key.
///
/// # Errors
///
/// Returns `Corruption` if the key is shorter than the tag or carries an
/// unknown value type.
pub fn parse_internal_key(data: &[u8]) -> Result<ParsedInternalKey<'_>> {
    if data.len() < TAG_SIZE {
        return Err(Error::corruption(format!(
            "internal key too short: {} bytes",
            data.len()
        )));
    }
    let tag = extract_tag(data);
    let value_type = ValueType::from_u8((tag & 0xff) as u8)
        .ok_or_else(|| Error::corruption(format!("invalid value type {}", tag & 0xff)))?;

    Ok(ParsedInternalKey {
        user_key: extract_user_key(data),
        sequence: tag >> 8,
        value_type,
    })
}

/// Internal key used in MemTable and tables.
///
/// # Ordering
///
/// The `Ord` implementation orders user keys bytewise. Code that needs a
/// custom user order goes through [`InternalKeyComparator`] on the encoded
/// form instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    user_key: Vec<u8>,
    sequence: u64,
    value_type: ValueType,
}

impl InternalKey {
    /// Creates a new InternalKey.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tablestore::memtable::{InternalKey, ValueType};
    ///
    /// let key = InternalKey::new(b"user_key".to_vec(), 42, ValueType::Value);
    /// assert_eq!(key.encoded_size(), 8 + 8);
    /// ```
    pub fn new(user_key: Vec<u8>, sequence: u64, value_type: ValueType) -> Self {
        Self { user_key, sequence, value_type }
    }

    /// Returns the user key.
    pub fn user_key(&self) -> &[u8] {
        &self.user_key
    }

    /// Returns the sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the value type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Encodes the InternalKey into bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        append_internal_key(&mut buf, &self.user_key, self.sequence, self.value_type);
        buf
    }

    /// Decodes an InternalKey from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let parsed = parse_internal_key(data)?;
        Ok(Self::new(parsed.user_key.to_vec(), parsed.sequence, parsed.value_type))
    }

    /// Returns the total encoded size of this InternalKey.
    pub fn encoded_size(&self) -> usize {
        self.user_key.len() + TAG_SIZE
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key.cmp(&other.user_key).then_with(|| {
            pack_tag(other.sequence, other.value_type)
                .cmp(&pack_tag(self.sequence, self.value_type))
        })
    }
}

/// Orders encoded internal keys: user key ascending under the wrapped user
/// comparator, then tag descending.
///
/// Separator and successor computation shortens only the user key portion and
/// re-attaches the largest possible tag, so the result still sorts before
/// every version of the next user key.
#[derive(Clone)]
pub struct InternalKeyComparator {
    user: Arc<dyn Comparator>,
    name: String,
}

impl InternalKeyComparator {
    /// Wraps a user comparator.
    pub fn new(user: Arc<dyn Comparator>) -> Self {
        let name = format!("tablestore.InternalKeyComparator:{}", user.name());
        Self { user, name }
    }

    /// Returns the wrapped user comparator.
    pub fn user_comparator(&self) -> &Arc<dyn Comparator> {
        &self.user
    }

    /// Compares two user keys under the wrapped comparator.
    pub fn compare_user_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.user.compare(a, b)
    }
}

impl Default for InternalKeyComparator {
    fn default() -> Self {
        Self::new(Arc::new(BytewiseComparator))
    }
}

impl std::fmt::Debug for InternalKeyComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalKeyComparator").field("name", &self.name).finish()
    }
}

impl Comparator for InternalKeyComparator {
    fn name(&self) -> &str {
        &self.name
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.user
            .compare(extract_user_key(a), extract_user_key(b))
            .then_with(|| extract_tag(b).cmp(&extract_tag(a)))
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let user_start = extract_user_key(start);
        let user_limit = extract_user_key(limit);
        let mut tmp = user_start.to_vec();
        self.user.find_shortest_separator(&mut tmp, user_limit);

        if tmp.len() < user_start.len() && self.user.compare(user_start, &tmp) == Ordering::Less {
            tmp.extend_from_slice(&pack_tag(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK).to_le_bytes());
            debug_assert_eq!(self.compare(start, &tmp), Ordering::Less);
            debug_assert_eq!(self.compare(&tmp, limit), Ordering::Less);
            *start = tmp;
        }
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        let user_key = extract_user_key(key);
        let mut tmp = user_key.to_vec();
        self.user.find_short_successor(&mut tmp);

        if tmp.len() < user_key.len() && self.user.compare(user_key, &tmp) == Ordering::Less {
            tmp.extend_from_slice(&pack_tag(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK).to_le_bytes());
            *key = tmp;
        }
    }
}
