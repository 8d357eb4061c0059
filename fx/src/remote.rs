//! Rate source backed by a remote rate service.
//!
//! The service answers `GET {base_url}/rates?base=USD` with
//! `{"base": "USD", "rates": {"EUR": 0.92, "RUB": 90.1}}`.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use wallet_common::{Currency, CurrencyPair};

use crate::error::{FxError, FxResult};
use crate::provider::{checked_rate, RateSource};

/// Retries an async operation on provider errors.
///
/// Total runs are one initial attempt plus `retries`. Errors other than
/// [`FxError::ProviderError`] are returned immediately.
pub async fn with_retry<F, Fut, T>(mut operation: F, retries: usize, delay: Duration) -> FxResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FxResult<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err @ FxError::ProviderError(_)) if attempt <= retries => {
                debug!(attempt, retries, error = %err, "Rate fetch failed, retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    base: String,
    rates: HashMap<String, Decimal>,
}

/// Rate source calling a remote HTTP service.
pub struct HttpRateSource {
    client: reqwest::Client,
    base_url: String,
    retries: usize,
    retry_delay: Duration,
}

impl HttpRateSource {
    /// Create a source with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FxResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retries: 2,
            retry_delay: Duration::from_millis(200),
        })
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, retries: usize, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    async fn fetch_once(&self, base: Currency) -> FxResult<BTreeMap<Currency, Decimal>> {
        let response = self
            .client
            .get(format!("{}/rates", self.base_url))
            .query(&[("base", base.code())])
            .send()
            .await?
            .error_for_status()?;
        let body: RatesResponse = response.json().await?;

        if body.base != base.code() {
            return Err(FxError::ProviderError(format!(
                "asked for base {base}, service answered {}",
                body.base
            )));
        }

        let mut rates = BTreeMap::new();
        for (code, rate) in body.rates {
            match code.parse::<Currency>() {
                Ok(to) => {
                    rates.insert(to, rate);
                }
                Err(_) => debug!(base = %base, currency = %code, "Ignoring unsupported currency"),
            }
        }
        Ok(rates)
    }

    #[instrument(skip(self))]
    async fn fetch(&self, base: Currency) -> FxResult<BTreeMap<Currency, Decimal>> {
        with_retry(|| self.fetch_once(base), self.retries, self.retry_delay)
            .await
            .map_err(|err| {
                warn!(base = %base, error = %err, "Remote rate service failed");
                err
            })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    fn name(&self) -> &str {
        "remote"
    }

    async fn lookup_rate(&self, pair: &CurrencyPair) -> FxResult<Decimal> {
        let rates = self.fetch(pair.from).await?;
        let rate = rates
            .get(&pair.to)
            .copied()
            .ok_or(FxError::RateNotAvailable(*pair))?;
        checked_rate(pair, rate)
    }

    async fn list_rates(&self, base: Currency) -> FxResult<BTreeMap<Currency, Decimal>> {
        let mut rates = self.fetch(base).await?;
        rates.retain(|_, rate| *rate > Decimal::ZERO);
        rates.insert(base, Decimal::ONE);
        Ok(rates)
    }
}
