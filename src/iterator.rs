//! The iterator contract shared by blocks, tables and memtables.
//!
//! Every reader exposes its entries through [`KvIterator`], so callers can
//! treat a block, a table and a memtable interchangeably.
//!
//! # Example
//!
//! ```rust
//! use tablestore::{KvIterator, MemTable};
//! use tablestore::memtable::ValueType;
//!
//! let memtable = MemTable::default();
//! memtable.add(1, ValueType::Value, b"key1", b"value1");
//! memtable.add(2, ValueType::Value, b"key2", b"value2");
//!
//! let mut iter = memtable.new_iterator();
//! iter.seek_to_first();
//! while iter.valid() {
//!     println!("{:?} => {:?}", iter.key(), iter.value());
//!     iter.next();
//! }
//! assert!(iter.status().is_ok());
//! ```

use crate::memtable::internal_key::{extract_user_key, lookup_key, MAX_SEQUENCE_NUMBER, TAG_SIZE};
use crate::{Error, Result};

/// A positioned cursor over sorted key/value entries.
///
/// An iterator is positioned (`valid()`), before the first entry, after the
/// last entry, or failed. It is unpositioned until one of the seek calls runs.
/// `key` and `value` may only be called while `valid()`; calling them
/// otherwise panics.
///
/// Errors found while moving are latched: the iterator becomes invalid and
/// `status()` keeps reporting the first error.
pub trait KvIterator: Send {
    /// Whether the iterator is positioned at an entry.
    fn valid(&self) -> bool;

    /// Positions at the first entry, if any.
    fn seek_to_first(&mut self);

    /// Positions at the last entry, if any.
    fn seek_to_last(&mut self);

    /// Positions at the first entry with key `>= target`.
    fn seek(&mut self, target: &[u8]);

    /// Advances to the next entry. Requires `valid()`.
    fn next(&mut self);

    /// Moves to the previous entry. Requires `valid()`.
    fn prev(&mut self);

    /// Key of the current entry.
    fn key(&self) -> &[u8];

    /// Value of the current entry.
    fn value(&self) -> &[u8];

    /// The first error encountered, if any.
    fn status(&self) -> Result<()>;
}

impl<I: KvIterator + ?Sized> KvIterator for Box<I> {
    fn valid(&self) -> bool {
        (**self).valid()
    }

    fn seek_to_first(&mut self) {
        (**self).seek_to_first()
    }

    fn seek_to_last(&mut self) {
        (**self).seek_to_last()
    }

    fn seek(&mut self, target: &[u8]) {
        (**self).seek(target)
    }

    fn next(&mut self) {
        (**self).next()
    }

    fn prev(&mut self) {
        (**self).prev()
    }

    fn key(&self) -> &[u8] {
        (**self).key()
    }

    fn value(&self) -> &[u8] {
        (**self).value()
    }

    fn status(&self) -> Result<()> {
        (**self).status()
    }
}

/// An iterator with no entries, optionally reporting an error.
#[derive(Debug, Default)]
pub struct EmptyIterator {
    error: Option<Error>,
}

impl EmptyIterator {
    /// An empty iterator with an ok status.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty iterator whose status is `error`.
    pub fn with_error(error: Error) -> Self {
        Self { error: Some(error) }
    }
}

impl KvIterator for EmptyIterator {
    fn valid(&self) -> bool {
        false
    }

    fn seek_to_first(&mut self) {}

    fn seek_to_last(&mut self) {}

    fn seek(&mut self, _target: &[u8]) {}

    fn next(&mut self) {
        panic!("next() called on an empty iterator");
    }

    fn prev(&mut self) {
        panic!("prev() called on an empty iterator");
    }

    fn key(&self) -> &[u8] {
        panic!("key() called on an empty iterator");
    }

    fn value(&self) -> &[u8] {
        panic!("value() called on an empty iterator");
    }

    fn status(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Presents an iterator over internal keys as one over user keys.
///
/// Every version of a user key is still visited, newest first; this strips
/// the framing, it does not resolve shadowing. `seek` takes a user key.
pub struct UserKeyIterator<I> {
    inner: I,
    error: Option<Error>,
}

impl<I: KvIterator> UserKeyIterator<I> {
    /// Wraps an iterator over internal keys.
    pub fn new(inner: I) -> Self {
        Self { inner, error: None }
    }

    /// Unwraps the inner iterator.
    pub fn into_inner(self) -> I {
        self.inner
    }

    fn check_framing(&mut self) {
        if self.error.is_none() && self.inner.valid() && self.inner.key().len() < TAG_SIZE {
            self.error = Some(Error::corruption("internal key too short"));
        }
    }
}

impl<I: KvIterator> KvIterator for UserKeyIterator<I> {
    fn valid(&self) -> bool {
        self.error.is_none() && self.inner.valid()
    }

    fn seek_to_first(&mut self) {
        self.inner.seek_to_first();
        self.check_framing();
    }

    fn seek_to_last(&mut self) {
        self.inner.seek_to_last();
        self.check_framing();
    }

    fn seek(&mut self, target: &[u8]) {
        self.inner.seek(&lookup_key(target, MAX_SEQUENCE_NUMBER));
        self.check_framing();
    }

    fn next(&mut self) {
        self.inner.next();
        self.check_framing();
    }

    fn prev(&mut self) {
        self.inner.prev();
        self.check_framing();
    }

    fn key(&self) -> &[u8] {
        extract_user_key(self.inner.key())
    }

    fn value(&self) -> &[u8] {
        self.inner.value()
    }

    fn status(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => self.inner.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memtable::{MemTable, ValueType};

    #[test]
    fn test_empty_iterator() {
        let mut iter = EmptyIterator::new();
        iter.seek_to_first();
        assert!(!iter.valid());
        iter.seek(b"anything");
        assert!(!iter.valid());
        assert!(iter.status().is_ok());

        let failed = EmptyIterator::with_error(Error::corruption("bad block"));
        assert!(!failed.valid());
        assert!(failed.status().unwrap_err().is_corruption());
    }

    #[test]
    #[should_panic]
    fn test_empty_iterator_key_panics() {
        EmptyIterator::new().key();
    }

    #[test]
    fn test_user_key_iterator_strips_framing() {
        let memtable = MemTable::default();
        memtable.add(1, ValueType::Value, b"a", b"a1");
        memtable.add(2, ValueType::Value, b"b", b"b2");
        memtable.add(3, ValueType::Deletion, b"b", b"");
        memtable.add(4, ValueType::Value, b"c", b"c4");

        let mut iter = UserKeyIterator::new(memtable.new_iterator());
        iter.seek_to_first();
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.next();
        }
        assert_eq!(
            seen,
            vec![
                (b"a".to_vec(), b"a1".to_vec()),
                (b"b".to_vec(), b"".to_vec()),
                (b"b".to_vec(), b"b2".to_vec()),
                (b"c".to_vec(), b"c4".to_vec()),
            ]
        );

        iter.seek(b"b");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"b");
        assert_eq!(iter.value(), b"");

        iter.seek_to_last();
        assert_eq!(iter.key(), b"c");
        iter.prev();
        assert_eq!(iter.value(), b"b2");
        assert!(iter.status().is_ok());
    }
}
