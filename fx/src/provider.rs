//! Rate source trait and the in-process implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::debug;

use wallet_common::{Currency, CurrencyPair};

use crate::error::{FxError, FxResult};

/// Authoritative, read-only source of exchange rates.
///
/// A rate is the number of `to` units per one `from` unit. Pairs resolve
/// directly or not at all.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Look up the rate for an ordered pair.
    async fn lookup_rate(&self, pair: &CurrencyPair) -> FxResult<Decimal>;

    /// All known rates from `base`, always including `base -> 1`.
    async fn list_rates(&self, base: Currency) -> FxResult<BTreeMap<Currency, Decimal>>;
}

/// Reject non-positive rates coming back from a source.
pub(crate) fn checked_rate(pair: &CurrencyPair, rate: Decimal) -> FxResult<Decimal> {
    if rate <= Decimal::ZERO {
        return Err(FxError::InvalidRate { pair: *pair, rate });
    }
    Ok(rate)
}

/// Rate source holding a fixed table in memory.
///
/// Used for tests and for running without a rates table.
#[derive(Default)]
pub struct StaticRateSource {
    rates: RwLock<HashMap<CurrencyPair, Decimal>>,
    lookups: AtomicU64,
}

impl StaticRateSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source from `(from, to, rate)` triples.
    pub fn from_rates(rates: impl IntoIterator<Item = (Currency, Currency, Decimal)>) -> Self {
        let source = Self::new();
        for (from, to, rate) in rates {
            source.set_rate(CurrencyPair::new(from, to), rate);
        }
        source
    }

    /// Set or replace a rate.
    pub fn set_rate(&self, pair: CurrencyPair, rate: Decimal) {
        self.rates.write().insert(pair, rate);
    }

    /// Number of `lookup_rate` calls served.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn lookup_rate(&self, pair: &CurrencyPair) -> FxResult<Decimal> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let rate = self
            .rates
            .read()
            .get(pair)
            .copied()
            .ok_or(FxError::RateNotAvailable(*pair))?;
        debug!(pair = %pair, rate = %rate, "Static rate lookup");
        checked_rate(pair, rate)
    }

    async fn list_rates(&self, base: Currency) -> FxResult<BTreeMap<Currency, Decimal>> {
        let mut listed: BTreeMap<Currency, Decimal> = self
            .rates
            .read()
            .iter()
            .filter(|(pair, rate)| pair.from == base && **rate > Decimal::ZERO)
            .map(|(pair, rate)| (pair.to, *rate))
            .collect();
        listed.insert(base, Decimal::ONE);
        Ok(listed)
    }
}
