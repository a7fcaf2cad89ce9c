//! LRU (Least Recently Used) cache implementation for block caching.
//!
//! Entries are reference counted. A [`CacheHandle`] returned by `insert` or
//! `lookup` pins its entry: eviction skips pinned entries, so a block an
//! iterator is scanning stays resident until the iterator lets go of it.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use log::trace;
use parking_lot::Mutex;

/// A unique identifier for a cached block.
///
/// Combines the identity of the file the block belongs to with the block's
/// offset, so blocks of different files never collide even at equal offsets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Identity of the file (or reader) the block belongs to
    pub file_id: Bytes,
    /// Block offset in the file
    pub offset: u64,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(file_id: impl Into<Bytes>, offset: u64) -> Self {
        Self { file_id: file_id.into(), offset }
    }
}

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of cache lookups
    pub lookups: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of insertions
    pub insertions: u64,
    /// Number of evictions
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }

    /// Reset all statistics to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

type CacheValue = Arc<dyn Any + Send + Sync>;

/// A pinned reference to a cached value.
///
/// The entry cannot be evicted while any handle to it is alive. Dropping the
/// handle releases the pin.
#[derive(Clone)]
pub struct CacheHandle {
    key: CacheKey,
    value: CacheValue,
    charge: usize,
}

impl CacheHandle {
    /// Key the entry was cached under.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Charge the entry counts against the capacity.
    pub fn charge(&self) -> usize {
        self.charge
    }

    /// Borrows the value as `T`, if it has that type.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Shares the value as `Arc<T>`, if it has that type.
    ///
    /// The returned `Arc` keeps the entry pinned like the handle does.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }
}

impl fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHandle").field("key", &self.key).field("charge", &self.charge).finish()
    }
}

struct Entry {
    value: CacheValue,
    charge: usize,
    tick: u64,
}

impl Entry {
    fn is_pinned(&self) -> bool {
        Arc::strong_count(&self.value) > 1
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    /// Recency order: smallest tick is least recently used
    lru: BTreeMap<u64, CacheKey>,
    usage: usize,
    next_tick: u64,
    stats: CacheStats,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.tick);
        self.usage -= entry.charge;
        Some(entry)
    }

    /// Evicts unpinned entries, oldest first, until usage fits `capacity`.
    fn evict(&mut self, capacity: usize) {
        if self.usage <= capacity {
            return;
        }

        let mut excess = self.usage - capacity;
        let mut victims = Vec::new();
        for key in self.lru.values() {
            if excess == 0 {
                break;
            }
            if let Some(entry) = self.entries.get(key) {
                if !entry.is_pinned() {
                    excess = excess.saturating_sub(entry.charge);
                    victims.push(key.clone());
                }
            }
        }

        for key in victims {
            if let Some(entry) = self.remove(&key) {
                trace!("Evicted block cache entry at offset {} ({} bytes)", key.offset, entry.charge);
                self.stats.evictions += 1;
            }
        }
    }
}

/// Thread-safe LRU cache for table blocks.
///
/// Uses a HashMap for lookups and a tick-ordered BTreeMap for LRU order,
/// both behind one mutex. Values are type-erased so the same cache holds
/// data blocks, index blocks and filters.
///
/// # Thread Safety
///
/// This cache is thread-safe and can be shared across multiple threads
/// using `Arc<BlockCache>`.
pub struct BlockCache {
    /// Maximum cache capacity in bytes
    capacity: usize,
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BlockCache")
            .field("capacity", &self.capacity)
            .field("usage", &inner.usage)
            .field("entries", &inner.entries.len())
            .finish()
    }
}

impl BlockCache {
    /// Create a new BlockCache with the specified capacity.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum total charge in bytes. A capacity of 0 retains nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use tablestore::cache::BlockCache;
    ///
    /// // Create a 8MB cache
    /// let cache = BlockCache::new(8 * 1024 * 1024);
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(Inner::default()), next_id: AtomicU64::new(1) }
    }

    /// Insert a value into the cache and return a handle pinning it.
    ///
    /// An existing entry under `key` is replaced. If the cache is over
    /// capacity afterwards, least recently used unpinned entries are evicted.
    /// A value whose charge exceeds the capacity is not retained; the
    /// returned handle still gives access to it.
    pub fn insert<T: Any + Send + Sync>(&self, key: CacheKey, value: T, charge: usize) -> CacheHandle {
        let value: CacheValue = Arc::new(value);
        let handle = CacheHandle { key: key.clone(), value: Arc::clone(&value), charge };

        if charge > self.capacity {
            return handle;
        }

        let mut inner = self.inner.lock();
        inner.remove(&key);
        let tick = inner.tick();
        inner.lru.insert(tick, key.clone());
        inner.entries.insert(key, Entry { value, charge, tick });
        inner.usage += charge;
        inner.stats.insertions += 1;
        inner.evict(self.capacity);

        handle
    }

    /// Look up a value, marking it most recently used.
    pub fn lookup(&self, key: &CacheKey) -> Option<CacheHandle> {
        let mut inner = self.inner.lock();
        inner.stats.lookups += 1;

        let tick = inner.tick();
        let Some(entry) = inner.entries.get_mut(key) else {
            inner.stats.misses += 1;
            return None;
        };

        let old_tick = std::mem::replace(&mut entry.tick, tick);
        let handle = CacheHandle { key: key.clone(), value: Arc::clone(&entry.value), charge: entry.charge };
        inner.lru.remove(&old_tick);
        inner.lru.insert(tick, key.clone());
        inner.stats.hits += 1;

        Some(handle)
    }

    /// Whether `key` is cached. Does not change recency or statistics.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Remove an entry. Outstanding handles keep the value alive.
    pub fn erase(&self, key: &CacheKey) {
        self.inner.lock().remove(key);
    }

    /// A fresh id for readers whose file has no stable identity.
    pub fn new_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    /// Reset cache statistics to zero.
    pub fn reset_stats(&self) {
        self.inner.lock().stats.reset();
    }

    /// Clear all entries from the cache.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.lru.clear();
        inner.usage = 0;
    }

    /// Total charge of the cached entries.
    pub fn usage(&self) -> usize {
        self.inner.lock().usage
    }

    /// Total charge of the entries currently pinned by a handle.
    pub fn pinned_usage(&self) -> usize {
        self.inner.lock().entries.values().filter(|e| e.is_pinned()).map(|e| e.charge).sum()
    }

    /// Get the cache capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn key(id: u8, offset: u64) -> CacheKey {
        CacheKey::new(vec![id], offset)
    }

    fn get(cache: &BlockCache, k: &CacheKey) -> Option<Bytes> {
        cache.lookup(k).and_then(|h| h.value::<Bytes>().cloned())
    }

    #[test]
    fn test_cache_basic_operations() {
        let cache = BlockCache::new(1024);
        let key1 = key(1, 0);
        let value1 = Bytes::from(vec![1, 2, 3, 4]);

        // Initially empty
        assert_eq!(get(&cache, &key1), None);

        drop(cache.insert(key1.clone(), value1.clone(), 4));
        assert_eq!(get(&cache, &key1), Some(value1));
        assert_eq!(cache.usage(), 4);

        let stats = cache.stats();
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.insertions, 1);
    }

    #[test]
    fn test_cache_lru_eviction() {
        // Holds three entries of charge 4
        let cache = BlockCache::new(12);
        let value = Bytes::from(vec![1, 2, 3, 4]);

        for id in 1..=3 {
            cache.insert(key(id, 0), value.clone(), 4);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.usage(), 12);

        // The fourth evicts the least recently used
        cache.insert(key(4, 0), value.clone(), 4);
        assert_eq!(cache.len(), 3);
        assert_eq!(get(&cache, &key(1, 0)), None);
        assert!(cache.contains(&key(2, 0)));
        assert!(cache.contains(&key(3, 0)));
        assert!(cache.contains(&key(4, 0)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_cache_lookup_updates_lru() {
        let cache = BlockCache::new(12);
        let value = Bytes::from(vec![1, 2, 3, 4]);

        for id in 1..=3 {
            cache.insert(key(id, 0), value.clone(), 4);
        }
        assert!(get(&cache, &key(1, 0)).is_some());

        cache.insert(key(4, 0), value, 4);
        assert!(cache.contains(&key(1, 0)));
        assert!(!cache.contains(&key(2, 0)));
    }

    #[test]
    fn test_contains_does_not_touch() {
        let cache = BlockCache::new(8);
        cache.insert(key(1, 0), 1u32, 4);
        cache.insert(key(2, 0), 2u32, 4);

        // contains() leaves key 1 least recently used
        assert!(cache.contains(&key(1, 0)));
        assert_eq!(cache.stats().lookups, 0);

        cache.insert(key(3, 0), 3u32, 4);
        assert!(!cache.contains(&key(1, 0)));
        assert!(cache.contains(&key(2, 0)));
    }

    #[test]
    fn test_pinned_entries_survive_eviction() {
        let cache = BlockCache::new(8);
        let pinned = cache.insert(key(1, 0), Bytes::from_static(b"aaaa"), 4);
        cache.insert(key(2, 0), Bytes::from_static(b"bbbb"), 4);
        assert_eq!(cache.pinned_usage(), 4);

        // Key 1 is least recently used but pinned; key 2 goes instead
        cache.insert(key(3, 0), Bytes::from_static(b"cccc"), 4);
        assert!(cache.contains(&key(1, 0)));
        assert!(!cache.contains(&key(2, 0)));
        assert_eq!(pinned.value::<Bytes>().map(|b| &b[..]), Some(&b"aaaa"[..]));

        drop(pinned);
        assert_eq!(cache.pinned_usage(), 0);
        cache.insert(key(4, 0), Bytes::from_static(b"dddd"), 4);
        assert!(!cache.contains(&key(1, 0)));
    }

    #[test]
    fn test_cache_update_existing_key() {
        let cache = BlockCache::new(1024);
        let k = key(1, 0);

        cache.insert(k.clone(), Bytes::from(vec![1, 2, 3, 4]), 4);
        assert_eq!(cache.usage(), 4);

        cache.insert(k.clone(), Bytes::from(vec![5, 6, 7, 8, 9]), 5);
        assert_eq!(get(&cache, &k), Some(Bytes::from(vec![5, 6, 7, 8, 9])));
        assert_eq!(cache.usage(), 5);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_clear_and_erase() {
        let cache = BlockCache::new(1024);
        cache.insert(key(1, 0), 1u64, 8);
        cache.insert(key(2, 0), 2u64, 8);

        cache.erase(&key(1, 0));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.usage(), 8);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.usage(), 0);
    }

    #[test]
    fn test_cache_zero_capacity_retains_nothing() {
        let cache = BlockCache::new(0);
        let handle = cache.insert(key(1, 0), Bytes::from(vec![1, 2, 3, 4]), 4);

        // The caller can still use the value it inserted
        assert_eq!(handle.value::<Bytes>().map(|b| b.len()), Some(4));
        assert_eq!(get(&cache, &key(1, 0)), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_cache_large_value_not_cached() {
        let cache = BlockCache::new(10);
        cache.insert(key(1, 0), Bytes::from(vec![0u8; 100]), 100);
        assert!(!cache.contains(&key(1, 0)));
        assert_eq!(cache.usage(), 0);
    }

    #[test]
    fn test_same_offset_different_file() {
        let cache = BlockCache::new(1024);
        cache.insert(key(1, 100), "first".to_string(), 5);
        cache.insert(key(2, 100), "second".to_string(), 6);

        let first = cache.lookup(&key(1, 100)).unwrap();
        assert_eq!(first.value::<String>().map(String::as_str), Some("first"));
        assert!(first.value::<Bytes>().is_none());
        assert_eq!(first.downcast::<String>().map(|s| s.len()), Some(5));
    }

    #[test]
    fn test_new_id_unique() {
        let cache = BlockCache::new(16);
        let a = cache.new_id();
        let b = cache.new_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let cache = BlockCache::new(1024);
        cache.insert(key(1, 0), 0u8, 1);

        cache.lookup(&key(1, 0));
        cache.lookup(&key(1, 0));
        cache.lookup(&key(2, 0));

        let stats = cache.stats();
        assert_eq!(stats.lookups, 3);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.666).abs() < 0.01);

        cache.reset_stats();
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(BlockCache::new(1024));
        let handles: Vec<_> = (0..10u8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let k = key(i, 0);
                    let value = Bytes::from(vec![i; 10]);
                    cache.insert(k.clone(), value.clone(), 10);
                    assert_eq!(cache.lookup(&k).and_then(|h| h.value::<Bytes>().cloned()), Some(value));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 10);
    }
}
