//! Read-through cache in front of a rate source.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use wallet_common::{Currency, CurrencyPair};

use crate::cache::RateCache;
use crate::error::FxResult;
use crate::provider::RateSource;

/// Wraps a [`RateSource`] so pair lookups are served from a [`RateCache`]
/// while fresh.
///
/// Concurrent misses on the same pair may each reach the inner source; the
/// last insert wins. Listings always go to the inner source.
pub struct CachingRateSource {
    inner: Arc<dyn RateSource>,
    cache: Arc<RateCache>,
}

impl CachingRateSource {
    /// Create a caching wrapper around `inner`.
    pub fn new(inner: Arc<dyn RateSource>, cache: Arc<RateCache>) -> Self {
        Self { inner, cache }
    }

    /// Get the cache.
    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }
}

#[async_trait]
impl RateSource for CachingRateSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    #[instrument(skip(self))]
    async fn lookup_rate(&self, pair: &CurrencyPair) -> FxResult<Decimal> {
        if let Some(rate) = self.cache.get(pair) {
            return Ok(rate);
        }

        match self.inner.lookup_rate(pair).await {
            Ok(rate) => {
                debug!(pair = %pair, rate = %rate, "Caching fetched rate");
                self.cache.insert(*pair, rate);
                Ok(rate)
            }
            Err(err) => {
                warn!(pair = %pair, error = %err, "Rate lookup failed");
                Err(err)
            }
        }
    }

    async fn list_rates(&self, base: Currency) -> FxResult<BTreeMap<Currency, Decimal>> {
        self.inner.list_rates(base).await
    }
}
