//! # MemTable - In-Memory Sorted Table
//!
//! The MemTable buffers recent writes before they are flushed into a table.
//!
//! ## Design
//!
//! - Entries are encoded internal keys (user key + sequence + type), so
//!   every version of a user key is kept, newest first
//! - The ordered structure is pluggable ([`MemTableRepFactory`]); the default
//!   is a crossbeam skip list
//! - Deletions are tombstone entries; shadowing is left to the read path,
//!   except for the [`MemTable::get`] convenience
//!
//! ## Thread Safety
//!
//! Inserts and reads may run concurrently. Sequence numbers are assigned by
//! the caller.

pub mod internal_key;
mod rep;

pub use internal_key::{InternalKey, InternalKeyComparator, ValueType};
pub use rep::{BTreeFactory, BTreeRep, MemTableRep, MemTableRepFactory, RepEntry, SkipListFactory, SkipListRep};

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::comparator::Comparator;
use crate::config::Options;
use crate::iterator::KvIterator;
use crate::Result;
use internal_key::{append_internal_key, lookup_key, parse_internal_key};

/// Per-entry bookkeeping charged on top of key and value bytes
const ENTRY_OVERHEAD: usize = 16;

/// Outcome of a point lookup in a memtable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemTableGet {
    /// The newest visible version is a value.
    Found(Bytes),
    /// The newest visible version is a deletion.
    Deleted,
    /// No version is visible.
    Missing,
}

/// MemTable stores recent writes in memory.
///
/// # Example
///
/// ```rust
/// use tablestore::memtable::{MemTable, MemTableGet, ValueType};
///
/// let memtable = MemTable::default();
/// memtable.add(1, ValueType::Value, b"key1", b"value1");
/// assert_eq!(memtable.get(b"key1", 2)?, MemTableGet::Found(b"value1".to_vec().into()));
/// # Ok::<(), tablestore::Error>(())
/// ```
pub struct MemTable {
    cmp: Arc<InternalKeyComparator>,
    rep: Arc<dyn MemTableRep>,
    /// Approximate size in bytes (keys + values + overhead)
    memory_usage: AtomicUsize,
    /// Smallest sequence number added; u64::MAX while empty
    first_sequence: AtomicU64,
}

impl MemTable {
    /// Creates an empty memtable ordered by `cmp`.
    pub fn new(cmp: Arc<InternalKeyComparator>, factory: &dyn MemTableRepFactory) -> Self {
        let ordering: Arc<dyn Comparator> = Arc::clone(&cmp) as Arc<dyn Comparator>;
        let rep = factory.create(ordering);
        Self { cmp, rep, memory_usage: AtomicUsize::new(0), first_sequence: AtomicU64::new(u64::MAX) }
    }

    /// Creates an empty memtable from the comparator and factory in `options`.
    ///
    /// `options.comparator` is taken as the user comparator.
    pub fn from_options(options: &Options) -> Self {
        let cmp = Arc::new(InternalKeyComparator::new(Arc::clone(&options.comparator)));
        Self::new(cmp, options.memtable_factory.as_ref())
    }

    /// Inserts a version of `user_key`.
    ///
    /// Multiple versions of the same user key coexist, newest first.
    ///
    /// # Panics
    ///
    /// Panics if `sequence` exceeds [`internal_key::MAX_SEQUENCE_NUMBER`].
    pub fn add(&self, sequence: u64, value_type: ValueType, user_key: &[u8], value: &[u8]) {
        let mut key = Vec::new();
        append_internal_key(&mut key, user_key, sequence, value_type);
        let charge = key.len() + value.len() + ENTRY_OVERHEAD;

        self.rep.insert(Bytes::from(key), Bytes::copy_from_slice(value));
        self.memory_usage.fetch_add(charge, Ordering::Relaxed);
        self.first_sequence.fetch_min(sequence, Ordering::Relaxed);
    }

    /// Resolves the newest version of `user_key` with sequence `<= sequence`.
    ///
    /// An entry that does not parse as an internal key is reported as
    /// `Corruption`.
    pub fn get(&self, user_key: &[u8], sequence: u64) -> Result<MemTableGet> {
        let target = lookup_key(user_key, sequence);
        let Some((key, value)) = self.rep.lower_bound(&target, true) else {
            return Ok(MemTableGet::Missing);
        };

        let parsed = parse_internal_key(&key)?;
        if self.cmp.compare_user_keys(parsed.user_key, user_key) != CmpOrdering::Equal {
            return Ok(MemTableGet::Missing);
        }

        Ok(match parsed.value_type {
            ValueType::Value => MemTableGet::Found(value),
            ValueType::Deletion => MemTableGet::Deleted,
        })
    }

    /// Returns an iterator over the encoded internal keys.
    pub fn new_iterator(&self) -> MemTableIterator {
        MemTableIterator { rep: Arc::clone(&self.rep), current: None }
    }

    /// Returns the number of entries, counting every version.
    pub fn len(&self) -> usize {
        self.rep.len()
    }

    /// Returns `true` if the MemTable contains no entries.
    pub fn is_empty(&self) -> bool {
        self.rep.is_empty()
    }

    /// Returns the approximate size of the MemTable in bytes.
    pub fn approximate_memory_usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }

    /// Smallest sequence number added so far.
    pub fn first_sequence(&self) -> Option<u64> {
        match self.first_sequence.load(Ordering::Relaxed) {
            u64::MAX => None,
            seq => Some(seq),
        }
    }

    /// The internal key comparator ordering this memtable.
    pub fn comparator(&self) -> &Arc<InternalKeyComparator> {
        &self.cmp
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new(Arc::new(InternalKeyComparator::default()), &SkipListFactory)
    }
}

/// Iterator over MemTable entries in internal key order.
///
/// Holds the current entry and re-queries its neighbours on every move.
pub struct MemTableIterator {
    rep: Arc<dyn MemTableRep>,
    current: Option<RepEntry>,
}

impl KvIterator for MemTableIterator {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        self.current = self.rep.first();
    }

    fn seek_to_last(&mut self) {
        self.current = self.rep.last();
    }

    fn seek(&mut self, target: &[u8]) {
        self.current = self.rep.lower_bound(target, true);
    }

    fn next(&mut self) {
        let (key, _) = self.current.take().expect("next() on invalid memtable iterator");
        self.current = self.rep.lower_bound(&key, false);
    }

    fn prev(&mut self) {
        let (key, _) = self.current.take().expect("prev() on invalid memtable iterator");
        self.current = self.rep.upper_bound(&key, false);
    }

    fn key(&self) -> &[u8] {
        &self.current.as_ref().expect("key() on invalid memtable iterator").0
    }

    fn value(&self) -> &[u8] {
        &self.current.as_ref().expect("value() on invalid memtable iterator").1
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
