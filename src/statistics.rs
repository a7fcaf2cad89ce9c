//! Ticker counters recorded by table readers.
//!
//! A [`Statistics`] instance is shared through [`Options`](crate::Options);
//! tickers are plain atomic increments.

use std::sync::atomic::{AtomicU64, Ordering};

/// A countable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Ticker {
    /// Any block found in the block cache.
    BlockCacheHit,
    /// Any block missing from the block cache.
    BlockCacheMiss,
    /// Index block found in the block cache.
    BlockCacheIndexHit,
    /// Index block missing from the block cache.
    BlockCacheIndexMiss,
    /// Filter block found in the block cache.
    BlockCacheFilterHit,
    /// Filter block missing from the block cache.
    BlockCacheFilterMiss,
    /// Data block found in the block cache.
    BlockCacheDataHit,
    /// Data block missing from the block cache.
    BlockCacheDataMiss,
    /// A filter ruled out a point lookup.
    BloomFilterUseful,
}

const TICKER_COUNT: usize = Ticker::BloomFilterUseful as usize + 1;

impl Ticker {
    /// All tickers, in declaration order.
    pub const ALL: [Ticker; TICKER_COUNT] = [
        Ticker::BlockCacheHit,
        Ticker::BlockCacheMiss,
        Ticker::BlockCacheIndexHit,
        Ticker::BlockCacheIndexMiss,
        Ticker::BlockCacheFilterHit,
        Ticker::BlockCacheFilterMiss,
        Ticker::BlockCacheDataHit,
        Ticker::BlockCacheDataMiss,
        Ticker::BloomFilterUseful,
    ];

    /// Display name of the ticker.
    pub fn name(self) -> &'static str {
        match self {
            Ticker::BlockCacheHit => "block.cache.hit",
            Ticker::BlockCacheMiss => "block.cache.miss",
            Ticker::BlockCacheIndexHit => "block.cache.index.hit",
            Ticker::BlockCacheIndexMiss => "block.cache.index.miss",
            Ticker::BlockCacheFilterHit => "block.cache.filter.hit",
            Ticker::BlockCacheFilterMiss => "block.cache.filter.miss",
            Ticker::BlockCacheDataHit => "block.cache.data.hit",
            Ticker::BlockCacheDataMiss => "block.cache.data.miss",
            Ticker::BloomFilterUseful => "bloom.filter.useful",
        }
    }
}

/// Thread-safe ticker counters.
#[derive(Debug, Default)]
pub struct Statistics {
    tickers: [AtomicU64; TICKER_COUNT],
}

impl Statistics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` to `ticker`.
    pub fn record(&self, ticker: Ticker, count: u64) {
        self.tickers[ticker as usize].fetch_add(count, Ordering::Relaxed);
    }

    /// Current value of `ticker`.
    pub fn get(&self, ticker: Ticker) -> u64 {
        self.tickers[ticker as usize].load(Ordering::Relaxed)
    }

    /// Resets every ticker to zero.
    pub fn reset(&self) {
        for ticker in &self.tickers {
            ticker.store(0, Ordering::Relaxed);
        }
    }
}

/// Records `ticker` if a sink is configured.
pub(crate) fn record_tick(statistics: Option<&Statistics>, ticker: Ticker) {
    if let Some(stats) = statistics {
        stats.record(ticker, 1);
    }
}
