//! Core ledger engine implementation.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use wallet_common::{
    checked_credit, convert, validate_amount, validate_rate, Balances, Currency, CurrencyPair,
    Result, UserKey, WalletError,
};

use crate::store::{BalanceStore, UnitOfWork};

/// Default upper bound on one unit of work.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Balance operations exposed to callers.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// All supported currencies for a user, zero-filled.
    async fn balance(&self, user: &UserKey) -> Result<Balances>;

    /// Credit `amount` of `currency`.
    async fn deposit(&self, user: &UserKey, currency: Currency, amount: Decimal) -> Result<()>;

    /// Debit `amount` of `currency`, failing with `InsufficientFunds` when short.
    async fn withdraw(&self, user: &UserKey, currency: Currency, amount: Decimal) -> Result<()>;

    /// Debit `amount` of `from` and credit `amount * rate` of `to` atomically.
    ///
    /// Returns the credited amount.
    async fn exchange(
        &self,
        user: &UserKey,
        from: Currency,
        to: Currency,
        amount: Decimal,
        rate: Decimal,
    ) -> Result<Decimal>;
}

/// The ledger engine runs each operation as one unit of work on a store.
pub struct LedgerEngine<S: BalanceStore> {
    store: S,
    op_timeout: Duration,
}

impl<S: BalanceStore> LedgerEngine<S> {
    /// Create a new ledger engine with the default operation timeout.
    pub fn new(store: S) -> Self {
        Self {
            store,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Set the operation timeout.
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Get the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a unit of work under the operation timeout.
    ///
    /// On timeout the future is dropped, which rolls back its transaction.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "Unit of work timed out and was rolled back"
                );
                Err(WalletError::Timeout(format!(
                    "{operation} exceeded {}ms",
                    self.op_timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl<S: BalanceStore> Ledger for LedgerEngine<S> {
    #[instrument(skip(self))]
    async fn balance(&self, user: &UserKey) -> Result<Balances> {
        let rows = self
            .bounded("balance", self.store.read_all(user))
            .await?;
        Ok(Balances::from_rows(rows))
    }

    #[instrument(skip(self))]
    async fn deposit(&self, user: &UserKey, currency: Currency, amount: Decimal) -> Result<()> {
        let amount = validate_amount(amount)?;

        self.bounded("deposit", async {
            let mut tx = self.store.begin().await?;
            let current = tx.lock(user, currency).await?;
            checked_credit(current, amount)?;
            tx.credit(user, currency, amount).await?;
            tx.commit().await
        })
        .await?;

        info!(user_key = %user, currency = %currency, amount = %amount, "Deposit committed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn withdraw(&self, user: &UserKey, currency: Currency, amount: Decimal) -> Result<()> {
        let amount = validate_amount(amount)?;

        let result = self
            .bounded("withdraw", async {
                let mut tx = self.store.begin().await?;
                let available = tx.lock(user, currency).await?;
                if available < amount {
                    return Err(WalletError::InsufficientFunds {
                        currency,
                        required: amount,
                        available,
                    });
                }
                tx.debit(user, currency, amount).await?;
                tx.commit().await?;
                Ok(available - amount)
            })
            .await;

        match result {
            Ok(remaining) => {
                info!(
                    user_key = %user,
                    currency = %currency,
                    amount = %amount,
                    remaining = %remaining,
                    "Withdrawal committed"
                );
                Ok(())
            }
            Err(err) => {
                if let WalletError::InsufficientFunds { available, .. } = &err {
                    info!(
                        user_key = %user,
                        currency = %currency,
                        amount = %amount,
                        available = %available,
                        "Withdrawal rejected: insufficient funds"
                    );
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    async fn exchange(
        &self,
        user: &UserKey,
        from: Currency,
        to: Currency,
        amount: Decimal,
        rate: Decimal,
    ) -> Result<Decimal> {
        let pair = CurrencyPair::new(from, to);
        if pair.is_degenerate() {
            return Err(WalletError::validation(
                format!("cannot exchange {from} into itself"),
                "to_currency",
            ));
        }
        let amount = validate_amount(amount)?;
        let rate = validate_rate(rate)?;
        let credited = convert(amount, rate)?;

        self.bounded("exchange", async {
            let mut tx = self.store.begin().await?;

            // Lock both legs in canonical order.
            let (first, second) = if from < to { (from, to) } else { (to, from) };
            let first_amount = tx.lock(user, first).await?;
            let second_amount = tx.lock(user, second).await?;
            let (available, target) = if first == from {
                (first_amount, second_amount)
            } else {
                (second_amount, first_amount)
            };

            if available < amount {
                return Err(WalletError::InsufficientFunds {
                    currency: from,
                    required: amount,
                    available,
                });
            }
            checked_credit(target, credited)?;
            tx.debit(user, from, amount).await?;
            tx.credit(user, to, credited).await?;
            tx.commit().await
        })
        .await?;

        info!(
            user_key = %user,
            pair = %pair,
            amount = %amount,
            rate = %rate,
            credited = %credited,
            "Exchange committed"
        );
        Ok(credited)
    }
}
