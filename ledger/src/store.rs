//! Storage seam for the ledger.
//!
//! A [`BalanceStore`] hands out units of work. A unit of work holds exclusive
//! locks on the balance rows it has touched until it is committed or dropped;
//! dropping it without committing discards every staged change.

use async_trait::async_trait;
use rust_decimal::Decimal;

use wallet_common::{Currency, Result, UserKey};

/// Transactional store of `(user_key, currency, amount)` rows.
#[async_trait]
pub trait BalanceStore: Send + Sync + 'static {
    /// Unit of work type.
    type Tx: UnitOfWork;

    /// Get store name for logging.
    fn name(&self) -> &str;

    /// Begin a unit of work.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Read all committed rows of a user without locking.
    async fn read_all(&self, user: &UserKey) -> Result<Vec<(Currency, Decimal)>>;
}

/// One open transaction against a [`BalanceStore`].
#[async_trait]
pub trait UnitOfWork: Send + Sized {
    /// Take the exclusive row lock and return the current amount.
    ///
    /// A missing row is materialized at zero first, so the lock always has a
    /// row to hold. Callers touching several rows must lock them in
    /// [`Currency`] order.
    async fn lock(&mut self, user: &UserKey, currency: Currency) -> Result<Decimal>;

    /// Add to a row, creating it if absent.
    async fn credit(&mut self, user: &UserKey, currency: Currency, amount: Decimal) -> Result<()>;

    /// Subtract from a row previously locked in this unit of work.
    async fn debit(&mut self, user: &UserKey, currency: Currency, amount: Decimal) -> Result<()>;

    /// Make every staged change visible and release the locks.
    async fn commit(self) -> Result<()>;
}
