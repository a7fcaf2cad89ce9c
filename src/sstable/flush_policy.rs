//! Pluggable decision of when a data block is complete.

use crate::config::BlockBasedTableOptions;
use crate::sstable::block::BlockBuilder;

/// Decides, before each entry is added, whether the current data block
/// should be written out first.
pub trait FlushBlockPolicy: Send {
    /// Returns `true` if the block in `builder` must be flushed before
    /// `key`/`value` is added to the table.
    fn update(&mut self, key: &[u8], value: &[u8], builder: &BlockBuilder) -> bool;
}

/// Creates a flush policy for every table builder.
pub trait FlushBlockPolicyFactory: Send + Sync {
    /// Name of the policy.
    fn name(&self) -> &str;

    /// Creates a policy configured from `options`.
    fn new_policy(&self, options: &BlockBasedTableOptions) -> Box<dyn FlushBlockPolicy>;
}

/// Flushes once the block's estimated size reaches the target block size.
#[derive(Debug, Clone)]
pub struct FlushBlockBySizePolicy {
    block_size: usize,
}

impl FlushBlockBySizePolicy {
    /// Creates a policy targeting `block_size` bytes per block.
    pub fn new(block_size: usize) -> Self {
        Self { block_size }
    }
}

impl FlushBlockPolicy for FlushBlockBySizePolicy {
    fn update(&mut self, _key: &[u8], _value: &[u8], builder: &BlockBuilder) -> bool {
        !builder.is_empty() && builder.current_size_estimate() >= self.block_size
    }
}

/// Factory for [`FlushBlockBySizePolicy`], the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushBlockBySizePolicyFactory;

impl FlushBlockPolicyFactory for FlushBlockBySizePolicyFactory {
    fn name(&self) -> &str {
        "FlushBlockBySizePolicyFactory"
    }

    fn new_policy(&self, options: &BlockBasedTableOptions) -> Box<dyn FlushBlockPolicy> {
        Box::new(FlushBlockBySizePolicy::new(options.block_size))
    }
}
