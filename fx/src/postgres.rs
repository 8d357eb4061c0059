//! Rate source backed by the `exchange_rates` table.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use wallet_common::{Currency, CurrencyPair};

use crate::error::{FxError, FxResult};
use crate::provider::{checked_rate, RateSource};

/// DDL for the exchange rates table.
pub const EXCHANGE_RATES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS exchange_rates (
    from_currency TEXT        NOT NULL,
    to_currency   TEXT        NOT NULL,
    rate          NUMERIC     NOT NULL CHECK (rate > 0),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (from_currency, to_currency)
)
"#;

/// Rate source reading the local rates table.
#[derive(Clone)]
pub struct PgRateSource {
    pool: PgPool,
}

impl PgRateSource {
    /// Create a new source on a pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the rates table if it does not exist.
    pub async fn init_schema(&self) -> FxResult<()> {
        sqlx::query(EXCHANGE_RATES_SCHEMA).execute(&self.pool).await?;
        info!("Exchange rates schema ready");
        Ok(())
    }

    /// Insert or replace a rate. Rates are otherwise maintained out of band.
    pub async fn set_rate(&self, pair: &CurrencyPair, rate: Decimal) -> FxResult<()> {
        checked_rate(pair, rate)?;
        sqlx::query(
            "INSERT INTO exchange_rates (from_currency, to_currency, rate) VALUES ($1, $2, $3) \
             ON CONFLICT (from_currency, to_currency) \
             DO UPDATE SET rate = EXCLUDED.rate, updated_at = now()",
        )
        .bind(pair.from.code())
        .bind(pair.to.code())
        .bind(rate)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RateSource for PgRateSource {
    fn name(&self) -> &str {
        "database"
    }

    async fn lookup_rate(&self, pair: &CurrencyPair) -> FxResult<Decimal> {
        let rate: Option<Decimal> = sqlx::query_scalar(
            "SELECT rate FROM exchange_rates WHERE from_currency = $1 AND to_currency = $2",
        )
        .bind(pair.from.code())
        .bind(pair.to.code())
        .fetch_optional(&self.pool)
        .await?;

        let rate = rate.ok_or(FxError::RateNotAvailable(*pair))?;
        debug!(pair = %pair, rate = %rate, "Database rate lookup");
        checked_rate(pair, rate)
    }

    async fn list_rates(&self, base: Currency) -> FxResult<BTreeMap<Currency, Decimal>> {
        let rows: Vec<(String, Decimal)> = sqlx::query_as(
            "SELECT to_currency, rate FROM exchange_rates WHERE from_currency = $1",
        )
        .bind(base.code())
        .fetch_all(&self.pool)
        .await?;

        let mut rates = BTreeMap::new();
        for (code, rate) in rows {
            match code.parse::<Currency>() {
                Ok(to) if rate > Decimal::ZERO => {
                    rates.insert(to, rate);
                }
                _ => warn!(base = %base, to = %code, rate = %rate, "Skipping unusable rate row"),
            }
        }
        rates.insert(base, Decimal::ONE);
        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn test_source() -> PgRateSource {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let source = PgRateSource::new(PgPool::connect(&url).await.unwrap());
        source.init_schema().await.unwrap();
        source
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pg_lookup_and_list() {
        let source = test_source().await;
        let pair = CurrencyPair::new(Currency::Eur, Currency::Rub);
        source.set_rate(&pair, dec!(98.25)).await.unwrap();

        assert_eq!(source.lookup_rate(&pair).await.unwrap(), dec!(98.25));

        let rates = source.list_rates(Currency::Eur).await.unwrap();
        assert_eq!(rates[&Currency::Eur], Decimal::ONE);
        assert_eq!(rates[&Currency::Rub], dec!(98.25));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pg_rejects_non_positive_rate() {
        let source = test_source().await;
        let pair = CurrencyPair::new(Currency::Rub, Currency::Eur);
        assert!(source.set_rate(&pair, dec!(-1)).await.is_err());
    }
}
