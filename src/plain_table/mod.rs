//! Plain table: a table format for memory-resident files.
//!
//! Records are stored back to back without blocks, compression or block
//! cache participation; the reader maps the whole file into one contiguous
//! buffer and decodes records in place.
//!
//! ## File Format
//!
//! ```text
//! [Record 1]
//! ...
//! [Record N]
//! [Index Region]      // total-order offsets or prefix hash buckets
//! [Properties Block]
//! [Metaindex Block]   // "tablestore.properties" handle
//! [Footer: 48B]       // metaindex and index region handles, magic number
//! ```
//!
//! Each record:
//! ```text
//! [key_len: varint32]   // omitted when the user key length is fixed
//! [internal_key: bytes]
//! [value_len: varint32]
//! [value: bytes]
//! ```
//!
//! Keys must be internal keys. With a hash index, `seek` is a prefix seek:
//! it finds the first key `>=` the target among the keys sharing the
//! target's prefix, and backward iteration is not supported.

pub mod builder;
pub mod index;
pub mod reader;

use std::sync::Arc;

pub use builder::PlainTableBuilder;
pub use reader::{PlainTableIterator, PlainTableReader};

use crate::config::{Options, PlainTableIndexType, PlainTableOptions};
use crate::error::{Error, Result};
use crate::slice_transform::{NoopTransform, SliceTransform};

/// Magic number of plain tables ("tblplain")
pub const PLAIN_TABLE_MAGIC: u64 = 0x7462_6c70_6c61_696e;

/// Plain table property names.
pub mod names {
    /// Fixed user key length, 0 when variable.
    pub const USER_KEY_LEN: &str = "tablestore.plain.user.key.len";
    /// Index layout id.
    pub const INDEX_TYPE: &str = "tablestore.plain.index.type";
    /// Name of the prefix extractor, empty for total order.
    pub const PREFIX_EXTRACTOR: &str = "tablestore.plain.prefix.extractor";
}

/// The prefix extractor a plain table with `table_options` uses.
///
/// Fixed-prefix hashing needs a configured extractor with a fixed length;
/// full-prefix hashing uses the configured extractor or the whole user key.
pub(crate) fn prefix_extractor(
    options: &Options,
    table_options: &PlainTableOptions,
) -> Result<Option<Arc<dyn SliceTransform>>> {
    match table_options.index_type {
        PlainTableIndexType::TotalOrder => Ok(None),
        PlainTableIndexType::HashFixedPrefix => match &options.prefix_extractor {
            Some(extractor) if extractor.fixed_length().is_some() => Ok(Some(Arc::clone(extractor))),
            _ => Err(Error::invalid_argument("fixed prefix hash index requires a fixed-length prefix extractor")),
        },
        PlainTableIndexType::HashFullPrefix => Ok(Some(
            options.prefix_extractor.clone().unwrap_or_else(|| Arc::new(NoopTransform) as Arc<dyn SliceTransform>),
        )),
    }
}
