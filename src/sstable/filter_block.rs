//! The table-wide filter block.
//!
//! The builder buffers every key added to the table and hands them to the
//! filter policy when the table is finished; the reader probes the resulting
//! filter before a data block is fetched.

use std::sync::Arc;

use bytes::Bytes;

use crate::filter::FilterPolicy;

/// Metaindex key prefix of the filter block, followed by the policy name.
pub const FILTER_BLOCK_PREFIX: &str = "filter.";

/// Metaindex key under which a filter built by `policy` is stored.
pub fn filter_block_name(policy: &dyn FilterPolicy) -> String {
    format!("{}{}", FILTER_BLOCK_PREFIX, policy.name())
}

/// Accumulates the keys of a table and builds its filter.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    keys: Vec<u8>,
    starts: Vec<usize>,
}

impl FilterBlockBuilder {
    /// Creates a builder for `policy`.
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self { policy, keys: Vec::new(), starts: Vec::new() }
    }

    /// Records `key`.
    pub fn add_key(&mut self, key: &[u8]) {
        self.starts.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Number of keys recorded.
    pub fn num_keys(&self) -> usize {
        self.starts.len()
    }

    /// Builds the filter over every recorded key.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut ends = self.starts.iter().skip(1).copied().chain(std::iter::once(self.keys.len()));
        let keys: Vec<&[u8]> = self
            .starts
            .iter()
            .map(|&start| {
                let end = ends.next().unwrap_or(start);
                &self.keys[start..end]
            })
            .collect();
        let filter = self.policy.create_filter(&keys);

        self.keys.clear();
        self.starts.clear();
        filter
    }

    /// The policy building the filter.
    pub fn policy(&self) -> &Arc<dyn FilterPolicy> {
        &self.policy
    }
}

/// Probes the filter of an open table.
#[derive(Clone)]
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Bytes,
}

impl FilterBlockReader {
    /// Wraps the contents of a filter block.
    pub fn new(policy: Arc<dyn FilterPolicy>, data: Bytes) -> Self {
        Self { policy, data }
    }

    /// Returns `false` only if `key` is definitely not in the table.
    pub fn key_may_match(&self, key: &[u8]) -> bool {
        self.policy.key_may_match(key, &self.data)
    }

    /// Size of the filter in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::BloomFilterPolicy;

    #[test]
    fn test_filter_block() {
        let policy: Arc<dyn FilterPolicy> = Arc::new(BloomFilterPolicy::new(10));
        let mut builder = FilterBlockBuilder::new(Arc::clone(&policy));
        for i in 0..100 {
            builder.add_key(format!("key{:03}", i).as_bytes());
        }
        builder.add_key(b"");
        assert_eq!(builder.num_keys(), 101);

        let reader = FilterBlockReader::new(policy, Bytes::from(builder.finish()));
        for i in 0..100 {
            assert!(reader.key_may_match(format!("key{:03}", i).as_bytes()));
        }
        assert!(reader.key_may_match(b""));
        assert_eq!(builder.num_keys(), 0);

        let false_positives = (0..1000).filter(|i| reader.key_may_match(format!("miss{}", i).as_bytes())).count();
        assert!(false_positives < 100, "false positives: {}", false_positives);
    }

    #[test]
    fn test_filter_block_name() {
        assert_eq!(filter_block_name(&BloomFilterPolicy::default()), "filter.tablestore.BuiltinBloomFilter");
    }
}
