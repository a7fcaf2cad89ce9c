//! Key ordering.
//!
//! A [`Comparator`] defines the total order of keys inside blocks, tables and
//! memtables. Besides `compare`, it supplies the two key-shortening operations
//! the table builder uses to keep index keys small. The three operations form
//! one capability: a comparator that changes the order must also change how
//! separators and successors are computed.

use std::cmp::Ordering;
use std::sync::Arc;

/// A total order over byte strings plus the index-key shortening operations.
pub trait Comparator: Send + Sync {
    /// A stable name for this ordering.
    ///
    /// The name is persisted in table properties; a table can only be opened
    /// with a comparator of the same name.
    fn name(&self) -> &str;

    /// Three-way comparison of `a` and `b`.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Rewrites `start` to a short string `s` with `start <= s < limit`.
    ///
    /// Implementations may leave `start` unchanged. `start` is never moved
    /// past `limit`.
    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]);

    /// Rewrites `key` to a short string `s` with `s >= key`.
    fn find_short_successor(&self, key: &mut Vec<u8>);
}

/// Lexicographic byte order. This is the default comparator.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl BytewiseComparator {
    /// Name persisted for tables built with this comparator.
    pub const NAME: &'static str = "tablestore.BytewiseComparator";
}

impl Comparator for BytewiseComparator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let min_len = start.len().min(limit.len());
        let diff_index = shared_prefix_len(start, limit);

        // One string is a prefix of the other
        if diff_index >= min_len {
            return;
        }

        let diff_byte = start[diff_index];
        if diff_byte < 0xff && diff_byte + 1 < limit[diff_index] {
            start[diff_index] = diff_byte + 1;
            start.truncate(diff_index + 1);
            debug_assert_eq!(self.compare(start, limit), Ordering::Less);
        }
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        if let Some(pos) = key.iter().position(|&b| b != 0xff) {
            key[pos] += 1;
            key.truncate(pos + 1);
        }
        // A run of 0xff bytes is its own shortest successor
    }
}

/// Orders keys by their reversed byte string.
///
/// All three operations reverse their inputs, delegate to
/// [`BytewiseComparator`], and reverse the result back.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseBytewiseComparator;

impl ReverseBytewiseComparator {
    /// Name persisted for tables built with this comparator.
    pub const NAME: &'static str = "tablestore.ReverseBytewiseComparator";
}

fn reversed(key: &[u8]) -> Vec<u8> {
    key.iter().rev().copied().collect()
}

impl Comparator for ReverseBytewiseComparator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.iter().rev().cmp(b.iter().rev())
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let mut s = reversed(start);
        let l = reversed(limit);
        BytewiseComparator.find_shortest_separator(&mut s, &l);
        s.reverse();
        *start = s;
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        let mut s = reversed(key);
        BytewiseComparator.find_short_successor(&mut s);
        s.reverse();
        *key = s;
    }
}

/// Returns the shared default comparator.
pub fn bytewise() -> Arc<dyn Comparator> {
    Arc::new(BytewiseComparator)
}

/// Length of the common prefix of `a` and `b`.
pub(crate) fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
