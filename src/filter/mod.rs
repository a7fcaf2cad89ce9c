//! Filter implementations for efficient key existence checking.
//!
//! A table builder hands every key to a [`FilterPolicy`], which turns them
//! into one filter for the whole table. Readers probe it before fetching a
//! data block, so lookups of absent keys skip the block read.

pub mod bloom;

use std::sync::Arc;

pub use bloom::{BloomFilter, BloomFilterPolicy};

use crate::memtable::internal_key::extract_user_key;

/// Builds and probes filters over a set of keys.
pub trait FilterPolicy: Send + Sync {
    /// A stable name, persisted in the metaindex as `filter.<name>`.
    fn name(&self) -> &str;

    /// Builds a filter containing every key in `keys`.
    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8>;

    /// Returns `false` only if `key` was not among the keys `filter` was
    /// built from.
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

/// Applies a user-key filter policy to tables holding internal keys.
///
/// The sequence and kind framing is stripped before keys reach the wrapped
/// policy, so every version of a user key maps to the same filter entry.
#[derive(Clone)]
pub struct InternalFilterPolicy {
    user_policy: Arc<dyn FilterPolicy>,
}

impl InternalFilterPolicy {
    /// Wraps a policy over user keys.
    pub fn new(user_policy: Arc<dyn FilterPolicy>) -> Self {
        Self { user_policy }
    }
}

impl FilterPolicy for InternalFilterPolicy {
    fn name(&self) -> &str {
        self.user_policy.name()
    }

    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8> {
        let user_keys: Vec<&[u8]> = keys.iter().map(|k| extract_user_key(k)).collect();
        self.user_policy.create_filter(&user_keys)
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        self.user_policy.key_may_match(extract_user_key(key), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memtable::internal_key::{lookup_key, InternalKey, ValueType};

    #[test]
    fn test_internal_policy_matches_any_version() {
        let policy = InternalFilterPolicy::new(Arc::new(BloomFilterPolicy::new(10)));
        let stored = InternalKey::new(b"user".to_vec(), 7, ValueType::Value).encode();
        let filter = policy.create_filter(&[stored.as_slice()]);

        assert!(policy.key_may_match(&lookup_key(b"user", 100), &filter));
        assert!(policy.key_may_match(&lookup_key(b"user", 1), &filter));
        assert_eq!(policy.name(), BloomFilterPolicy::NAME);
    }
}
