//! Wallet service: rate resolution in front of the ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use wallet_common::{
    validate_amount, Balances, Currency, CurrencyPair, Result, UserKey, WalletError,
};
use wallet_fx::RateSource;
use wallet_ledger::Ledger;

use crate::metrics::SharedMetrics;

/// Outcome of a committed exchange.
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    /// Amount credited in the target currency.
    pub exchanged_amount: Decimal,
    /// Rate applied.
    pub rate: Decimal,
    /// Balances read after commit, if that read succeeded.
    pub balances: Option<Balances>,
}

/// Coordinates the ledger, the cached rate source and the counters.
pub struct WalletService {
    ledger: Arc<dyn Ledger>,
    rates: Arc<dyn RateSource>,
    metrics: SharedMetrics,
}

impl WalletService {
    /// Create a new service.
    pub fn new(ledger: Arc<dyn Ledger>, rates: Arc<dyn RateSource>, metrics: SharedMetrics) -> Self {
        Self {
            ledger,
            rates,
            metrics,
        }
    }

    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.metrics.operation_failed(err);
        }
        result
    }

    /// Balances of a user, zero-filled.
    pub async fn balance(&self, user: &UserKey) -> Result<Balances> {
        let result = self.ledger.balance(user).await;
        self.record(result)
    }

    /// Read balances after a committed mutation.
    ///
    /// The mutation already succeeded, so a failed read is logged and
    /// reported as `None` instead of an error.
    async fn balance_after_commit(
        &self,
        user: &UserKey,
        operation: &'static str,
    ) -> Option<Balances> {
        match self.ledger.balance(user).await {
            Ok(balances) => Some(balances),
            Err(err) => {
                warn!(
                    user_key = %user,
                    operation,
                    error = %err,
                    "Balance read after commit failed"
                );
                None
            }
        }
    }

    /// Deposit and return the balances afterwards.
    #[instrument(skip(self))]
    pub async fn deposit(
        &self,
        user: &UserKey,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Option<Balances>> {
        let result = self.ledger.deposit(user, currency, amount).await;
        self.record(result)?;
        self.metrics.deposit_committed();
        Ok(self.balance_after_commit(user, "deposit").await)
    }

    /// Withdraw and return the balances afterwards.
    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        user: &UserKey,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Option<Balances>> {
        let result = self.ledger.withdraw(user, currency, amount).await;
        self.record(result)?;
        self.metrics.withdrawal_committed();
        Ok(self.balance_after_commit(user, "withdraw").await)
    }

    /// Resolve the rate for `from -> to` and exchange `amount`.
    ///
    /// Input is validated before the rate is looked up.
    #[instrument(skip(self))]
    pub async fn exchange(
        &self,
        user: &UserKey,
        from: Currency,
        to: Currency,
        amount: Decimal,
    ) -> Result<ExchangeOutcome> {
        let pair = CurrencyPair::new(from, to);
        let checked = if pair.is_degenerate() {
            Err(WalletError::validation(
                "from_currency and to_currency must differ",
                "to_currency",
            ))
        } else {
            validate_amount(amount)
        };
        let amount = self.record(checked)?;

        let rate = self.rates.lookup_rate(&pair).await.map_err(WalletError::from);
        let rate = self.record(rate)?;

        let result = self.ledger.exchange(user, from, to, amount, rate).await;
        let exchanged_amount = self.record(result)?;
        self.metrics.exchange_committed();

        info!(user_key = %user, pair = %pair, rate = %rate, exchanged = %exchanged_amount, "Exchange served");
        Ok(ExchangeOutcome {
            exchanged_amount,
            rate,
            balances: self.balance_after_commit(user, "exchange").await,
        })
    }

    /// All rates from `base`, including `base -> 1`.
    pub async fn rates(&self, base: Currency) -> Result<BTreeMap<Currency, Decimal>> {
        let result = self.rates.list_rates(base).await.map_err(WalletError::from);
        self.record(result)
    }
}
