//! Ordered representations backing a [`MemTable`](super::MemTable).
//!
//! A representation stores encoded internal keys ordered by a comparator and
//! answers neighbour queries. Iterators never hold a borrow into the
//! structure: they keep the current entry and re-query its neighbours, so
//! concurrent inserts are either observed or not, never torn.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use parking_lot::RwLock;

use crate::comparator::Comparator;

/// A key ordered by a runtime comparator.
#[derive(Clone)]
pub struct MemKey {
    key: Bytes,
    cmp: Arc<dyn Comparator>,
}

impl MemKey {
    fn new(key: Bytes, cmp: &Arc<dyn Comparator>) -> Self {
        Self { key, cmp: Arc::clone(cmp) }
    }
}

impl PartialEq for MemKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MemKey {}

impl PartialOrd for MemKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp.compare(&self.key, &other.key)
    }
}

/// An entry as stored by a representation.
pub type RepEntry = (Bytes, Bytes);

/// An ordered map of encoded keys supporting concurrent insert and lookup.
pub trait MemTableRep: Send + Sync {
    /// Inserts an entry. Keys are unique; re-inserting a key replaces it.
    fn insert(&self, key: Bytes, value: Bytes);

    /// Number of entries.
    fn len(&self) -> usize;

    /// Whether there are no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest entry.
    fn first(&self) -> Option<RepEntry>;

    /// Largest entry.
    fn last(&self) -> Option<RepEntry>;

    /// First entry `>= target`, or `> target` when not `inclusive`.
    fn lower_bound(&self, target: &[u8], inclusive: bool) -> Option<RepEntry>;

    /// Last entry `<= target`, or `< target` when not `inclusive`.
    fn upper_bound(&self, target: &[u8], inclusive: bool) -> Option<RepEntry>;
}

/// Creates representations for new memtables.
pub trait MemTableRepFactory: Send + Sync {
    /// Name of the representation.
    fn name(&self) -> &str;

    /// Creates an empty representation ordered by `cmp`.
    fn create(&self, cmp: Arc<dyn Comparator>) -> Arc<dyn MemTableRep>;
}

fn bound(key: &MemKey, inclusive: bool) -> Bound<&MemKey> {
    if inclusive {
        Bound::Included(key)
    } else {
        Bound::Excluded(key)
    }
}

/// Lock-free skip list representation (crossbeam-skiplist).
pub struct SkipListRep {
    map: SkipMap<MemKey, Bytes>,
    cmp: Arc<dyn Comparator>,
}

impl SkipListRep {
    /// Creates an empty skip list ordered by `cmp`.
    pub fn new(cmp: Arc<dyn Comparator>) -> Self {
        Self { map: SkipMap::new(), cmp }
    }

    fn probe(&self, target: &[u8]) -> MemKey {
        MemKey::new(Bytes::copy_from_slice(target), &self.cmp)
    }
}

fn skip_entry(entry: crossbeam_skiplist::map::Entry<'_, MemKey, Bytes>) -> RepEntry {
    (entry.key().key.clone(), entry.value().clone())
}

impl MemTableRep for SkipListRep {
    fn insert(&self, key: Bytes, value: Bytes) {
        self.map.insert(MemKey::new(key, &self.cmp), value);
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn first(&self) -> Option<RepEntry> {
        self.map.front().map(skip_entry)
    }

    fn last(&self) -> Option<RepEntry> {
        self.map.back().map(skip_entry)
    }

    fn lower_bound(&self, target: &[u8], inclusive: bool) -> Option<RepEntry> {
        let probe = self.probe(target);
        self.map.lower_bound(bound(&probe, inclusive)).map(skip_entry)
    }

    fn upper_bound(&self, target: &[u8], inclusive: bool) -> Option<RepEntry> {
        let probe = self.probe(target);
        self.map.upper_bound(bound(&probe, inclusive)).map(skip_entry)
    }
}

/// Factory for [`SkipListRep`]. This is the default representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipListFactory;

impl MemTableRepFactory for SkipListFactory {
    fn name(&self) -> &str {
        "SkipListFactory"
    }

    fn create(&self, cmp: Arc<dyn Comparator>) -> Arc<dyn MemTableRep> {
        Arc::new(SkipListRep::new(cmp))
    }
}

/// Representation over a `BTreeMap` behind a read-write lock.
pub struct BTreeRep {
    map: RwLock<BTreeMap<MemKey, Bytes>>,
    cmp: Arc<dyn Comparator>,
}

impl BTreeRep {
    /// Creates an empty map ordered by `cmp`.
    pub fn new(cmp: Arc<dyn Comparator>) -> Self {
        Self { map: RwLock::new(BTreeMap::new()), cmp }
    }
}

fn btree_entry((key, value): (&MemKey, &Bytes)) -> RepEntry {
    (key.key.clone(), value.clone())
}

impl MemTableRep for BTreeRep {
    fn insert(&self, key: Bytes, value: Bytes) {
        self.map.write().insert(MemKey::new(key, &self.cmp), value);
    }

    fn len(&self) -> usize {
        self.map.read().len()
    }

    fn first(&self) -> Option<RepEntry> {
        self.map.read().first_key_value().map(btree_entry)
    }

    fn last(&self) -> Option<RepEntry> {
        self.map.read().last_key_value().map(btree_entry)
    }

    fn lower_bound(&self, target: &[u8], inclusive: bool) -> Option<RepEntry> {
        let probe = MemKey::new(Bytes::copy_from_slice(target), &self.cmp);
        let map = self.map.read();
        let found = map.range((bound(&probe, inclusive), Bound::Unbounded)).next().map(btree_entry);
        found
    }

    fn upper_bound(&self, target: &[u8], inclusive: bool) -> Option<RepEntry> {
        let probe = MemKey::new(Bytes::copy_from_slice(target), &self.cmp);
        let map = self.map.read();
        let found = map.range((Bound::Unbounded, bound(&probe, inclusive))).next_back().map(btree_entry);
        found
    }
}

/// Factory for [`BTreeRep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BTreeFactory;

impl MemTableRepFactory for BTreeFactory {
    fn name(&self) -> &str {
        "BTreeFactory"
    }

    fn create(&self, cmp: Arc<dyn Comparator>) -> Arc<dyn MemTableRep> {
        Arc::new(BTreeRep::new(cmp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{bytewise, ReverseBytewiseComparator};

    fn fill(rep: &dyn MemTableRep) {
        for key in ["b", "d", "f"] {
            rep.insert(Bytes::from(key), Bytes::from(format!("v{}", key)));
        }
    }

    fn key_of(entry: Option<RepEntry>) -> Option<Vec<u8>> {
        entry.map(|(k, _)| k.to_vec())
    }

    fn check_neighbours(rep: &dyn MemTableRep) {
        fill(rep);
        assert_eq!(rep.len(), 3);
        assert_eq!(key_of(rep.first()), Some(b"b".to_vec()));
        assert_eq!(key_of(rep.last()), Some(b"f".to_vec()));

        assert_eq!(key_of(rep.lower_bound(b"d", true)), Some(b"d".to_vec()));
        assert_eq!(key_of(rep.lower_bound(b"d", false)), Some(b"f".to_vec()));
        assert_eq!(key_of(rep.lower_bound(b"c", false)), Some(b"d".to_vec()));
        assert_eq!(key_of(rep.lower_bound(b"g", true)), None);

        assert_eq!(key_of(rep.upper_bound(b"d", true)), Some(b"d".to_vec()));
        assert_eq!(key_of(rep.upper_bound(b"d", false)), Some(b"b".to_vec()));
        assert_eq!(key_of(rep.upper_bound(b"a", true)), None);
    }

    #[test]
    fn test_skiplist_neighbours() {
        check_neighbours(&SkipListRep::new(bytewise()));
    }

    #[test]
    fn test_btree_neighbours() {
        check_neighbours(&BTreeRep::new(bytewise()));
    }

    #[test]
    fn test_rep_follows_comparator() {
        for factory in [&SkipListFactory as &dyn MemTableRepFactory, &BTreeFactory] {
            let rep = factory.create(Arc::new(ReverseBytewiseComparator));
            rep.insert(Bytes::from_static(b"ab"), Bytes::new());
            rep.insert(Bytes::from_static(b"ba"), Bytes::new());
            // "ba" reversed is "ab", which sorts first
            assert_eq!(key_of(rep.first()), Some(b"ba".to_vec()));
        }
    }
}
