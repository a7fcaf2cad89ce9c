//! # tablestore - Sorted Tables for an LSM-Tree Storage Engine
//!
//! tablestore is the storage layer underneath an LSM key-value engine: the
//! immutable on-disk table formats, the in-memory write buffer that feeds
//! them, and the block cache that serves repeated reads.
//!
//! ## Architecture
//!
//! - **MemTable**: in-memory sorted buffer of recent writes ([`memtable`])
//! - **Block-based table**: blocks with restart points, an index, an optional
//!   bloom filter and a properties block ([`sstable`])
//! - **Plain table**: unblocked records with a hash or total-order index, for
//!   memory-resident files ([`plain_table`])
//! - **Block cache**: LRU cache of decoded blocks shared by readers ([`cache`])
//! - **Table factories**: build or open either format through one interface
//!   ([`table`])
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use tablestore::env::{InMemoryFile, MemSink};
//! use tablestore::memtable::internal_key::lookup_key;
//! use tablestore::memtable::ValueType;
//! use tablestore::table::{build_table, BlockBasedTableFactory, TableFactory};
//! use tablestore::{InternalKeyComparator, MemTable, Options, ReadOptions};
//!
//! # fn main() -> Result<(), tablestore::Error> {
//! let memtable = MemTable::default();
//! memtable.add(1, ValueType::Value, b"key1", b"value1");
//! memtable.add(2, ValueType::Value, b"key2", b"value2");
//!
//! // Flush the memtable into a block-based table
//! let options = Options::default().comparator(Arc::new(InternalKeyComparator::default()));
//! let factory = BlockBasedTableFactory::default();
//! let sink = MemSink::new();
//! build_table(&factory, &options, &mut memtable.new_iterator(), Box::new(sink.clone()))?;
//!
//! // Read it back
//! let table = factory.open_table(&options, Arc::new(InMemoryFile::new(sink.contents())))?;
//! let (_, value) = table.get(&ReadOptions::default(), &lookup_key(b"key1", 10))?.unwrap();
//! assert_eq!(value, b"value1");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod cache;
pub mod coding;
pub mod comparator;
pub mod compression;
pub mod config;
pub mod env;
pub mod error;
pub mod filter;
pub mod iterator;
pub mod memtable;
pub mod plain_table;
pub mod slice_transform;
pub mod sstable;
pub mod statistics;
pub mod table;

// Re-exports
pub use cache::BlockCache;
pub use comparator::{BytewiseComparator, Comparator, ReverseBytewiseComparator};
pub use config::{BlockBasedTableOptions, CompressionType, Options, PlainTableIndexType, PlainTableOptions, ReadOptions};
pub use error::{Error, Result};
pub use iterator::KvIterator;
pub use memtable::{InternalKeyComparator, MemTable};
pub use plain_table::{PlainTableBuilder, PlainTableReader};
pub use sstable::{BlockBasedTable, BlockBasedTableBuilder, TableProperties};
pub use statistics::{Statistics, Ticker};
pub use table::{build_table, TableBuilder, TableFactory, TableReader};
