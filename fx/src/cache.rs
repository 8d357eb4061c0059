//! FX rate caching with TTL support.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use wallet_common::CurrencyPair;

/// Default freshness window.
pub const DEFAULT_RATE_TTL: Duration = Duration::from_secs(300);

/// Cached rate entry.
#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    rate: Decimal,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Configuration for rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// How long a stored rate may be served.
    pub ttl: Duration,
    /// Entry count that triggers a sweep of expired entries.
    pub max_entries: usize,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_RATE_TTL,
            max_entries: 1024,
        }
    }
}

/// Thread-safe rate cache keyed by ordered pair.
///
/// Expired entries are never returned. Removal is lazy: on read, or in a
/// sweep when an insert finds the cache at capacity.
pub struct RateCache {
    cache: DashMap<CurrencyPair, CacheEntry>,
    config: RateCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RateCache {
    /// Create a new rate cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(RateCacheConfig::default())
    }

    /// Create a new rate cache with custom configuration.
    pub fn with_config(config: RateCacheConfig) -> Self {
        Self {
            cache: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a rate from cache if still fresh.
    pub fn get(&self, pair: &CurrencyPair) -> Option<Decimal> {
        let now = Instant::now();
        if let Some(entry) = self.cache.get(pair).map(|e| *e) {
            if entry.is_valid(now) {
                debug!(pair = %pair, "Cache hit");
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.rate);
            }
            debug!(pair = %pair, "Cache entry expired");
            self.cache.remove_if(pair, |_, e| !e.is_valid(now));
        }

        debug!(pair = %pair, "Cache miss");
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a rate with a fresh expiry.
    pub fn insert(&self, pair: CurrencyPair, rate: Decimal) {
        if self.cache.len() >= self.config.max_entries {
            self.evict_expired();
        }
        let entry = CacheEntry {
            rate,
            expires_at: Instant::now() + self.config.ttl,
        };
        self.cache.insert(pair, entry);
    }

    /// Get the number of entries in cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Evict expired entries.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.cache.retain(|_, entry| entry.is_valid(now));
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let total = self.cache.len();
        let valid = self.cache.iter().filter(|e| e.is_valid(now)).count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total.saturating_sub(valid),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wallet_common::Currency;

    fn usd_eur() -> CurrencyPair {
        CurrencyPair::new(Currency::Usd, Currency::Eur)
    }

    fn eur_usd() -> CurrencyPair {
        CurrencyPair::new(Currency::Eur, Currency::Usd)
    }

    #[test]
    fn test_cache_insert_and_get() {
        let cache = RateCache::new();
        cache.insert(usd_eur(), dec!(0.92));

        assert_eq!(cache.get(&usd_eur()), Some(dec!(0.92)));
        assert!(cache.get(&eur_usd()).is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expiry() {
        let cache = RateCache::with_config(RateCacheConfig {
            ttl: Duration::from_secs(60),
            ..Default::default()
        });
        cache.insert(usd_eur(), dec!(0.92));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get(&usd_eur()).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&usd_eur()).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_at_capacity() {
        let cache = RateCache::with_config(RateCacheConfig {
            ttl: Duration::from_secs(10),
            max_entries: 2,
        });
        cache.insert(usd_eur(), dec!(0.92));
        cache.insert(CurrencyPair::new(Currency::Usd, Currency::Rub), dec!(90));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.stats().expired_entries, 2);

        cache.insert(CurrencyPair::new(Currency::Eur, Currency::Rub), dec!(98));
        assert_eq!(cache.len(), 1);
    }
}
