//! Block cache shared by table readers.
//!
//! Provides an LRU (Least Recently Used) cache to speed up repeated reads
//! of the same blocks. Entries are keyed by file identity and block offset,
//! so reopened tables reuse blocks cached by earlier readers.

mod lru;

pub use lru::{BlockCache, CacheHandle, CacheKey, CacheStats};
