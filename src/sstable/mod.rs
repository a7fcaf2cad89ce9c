//! Block-based table implementation.
//!
//! A block-based table is an immutable, sorted file of key-value pairs. The
//! format is designed for sequential writes and random reads through a block
//! cache.
//!
//! ## File Format
//!
//! ```text
//! [Data Block 1]
//! [Data Block 2]
//! ...
//! [Data Block N]
//! [Filter Block]      // optional, one per table
//! [Properties Block]  // table statistics
//! [Metaindex Block]   // "filter.<policy>" and "tablestore.properties" handles
//! [Index Block]       // separator key -> data block handle
//! [Footer: 48B]       // metaindex and index handles, magic number
//! ```
//!
//! Every block is followed by a 5-byte trailer holding the compression codec
//! id and a crc32 of the stored bytes; see [`format`].
//!
//! ## Index Format
//!
//! The index block has one entry per data block:
//! - Key: a separator `>=` every key of the block and `<` the first key of
//!   the next block, shortened by the comparator
//! - Value: the varint-encoded [`BlockHandle`] of the block

pub mod block;
pub mod builder;
pub mod filter_block;
pub mod flush_policy;
pub mod footer;
pub mod format;
pub mod index;
pub mod properties;
pub mod reader;
pub mod two_level;

pub use block::{Block, BlockBuilder, BlockIterator};
pub use builder::BlockBasedTableBuilder;
pub use flush_policy::{FlushBlockBySizePolicy, FlushBlockBySizePolicyFactory, FlushBlockPolicy, FlushBlockPolicyFactory};
pub use footer::{BlockHandle, Footer};
pub use index::{IndexBlock, IndexBuilder};
pub use properties::{TableProperties, TablePropertiesCollector, TablePropertiesCollectorFactory, UserCollectedProperties};
pub use reader::BlockBasedTable;
pub use two_level::TwoLevelIterator;

/// Size of the trailer after every block: codec id (1) + crc32 (4)
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Footer size in bytes (fixed)
pub const FOOTER_SIZE: usize = 48;

/// Magic number of block-based tables ("tblksbl1")
pub const BLOCK_BASED_TABLE_MAGIC: u64 = 0x7462_6c6b_7362_6c31;
