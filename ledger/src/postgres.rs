//! Postgres balance store.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};

use wallet_common::{Currency, Result, UserKey, WalletError};

use crate::store::{BalanceStore, UnitOfWork};

/// DDL for the balances table.
pub const BALANCES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS balances (
    user_key   TEXT        NOT NULL,
    currency   TEXT        NOT NULL,
    amount     NUMERIC     NOT NULL DEFAULT 0 CHECK (amount >= 0),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (user_key, currency)
)
"#;

/// Create the balances table if it does not exist.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(BALANCES_SCHEMA)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    info!("Balances schema ready");
    Ok(())
}

/// Map a sqlx error onto the wallet error taxonomy.
///
/// Lock-wait timeouts, cancellations, deadlocks, serialization failures and
/// pool exhaustion are retryable by the caller.
pub fn map_sqlx_error(err: sqlx::Error) -> WalletError {
    match &err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            let retryable = matches!(code.as_str(), "55P03" | "57014" | "40P01" | "40001");
            let message = match code.as_str() {
                "55P03" => format!("lock wait timeout: {}", db.message()),
                "23514" => format!("check constraint violated: {}", db.message()),
                _ => format!("database error {code}: {}", db.message()),
            };
            WalletError::Infrastructure { message, retryable }
        }
        sqlx::Error::PoolTimedOut => WalletError::Infrastructure {
            message: "connection pool timed out".into(),
            retryable: true,
        },
        other => WalletError::infrastructure(other.to_string()),
    }
}

/// Balance store on a Postgres connection pool.
#[derive(Clone)]
pub struct PgBalanceStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgBalanceStore {
    /// Create a store; every unit of work sets `lock_timeout` locally.
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    type Tx = PgUnitOfWork;

    fn name(&self) -> &str {
        "postgres"
    }

    async fn begin(&self) -> Result<PgUnitOfWork> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        // SET does not take bind parameters; the value is an integer.
        let set = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&set)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(PgUnitOfWork { tx })
    }

    async fn read_all(&self, user: &UserKey) -> Result<Vec<(Currency, Decimal)>> {
        let rows: Vec<(String, Decimal)> =
            sqlx::query_as("SELECT currency, amount FROM balances WHERE user_key = $1")
                .bind(user.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let mut balances = Vec::with_capacity(rows.len());
        for (code, amount) in rows {
            match code.parse::<Currency>() {
                Ok(currency) => balances.push((currency, amount)),
                Err(_) => warn!(user_key = %user, currency = %code, "Skipping unsupported currency row"),
            }
        }
        Ok(balances)
    }
}

/// One Postgres transaction. Dropping it rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock(&mut self, user: &UserKey, currency: Currency) -> Result<Decimal> {
        // Concurrent first writers serialize on the primary key here.
        sqlx::query(
            "INSERT INTO balances (user_key, currency, amount) VALUES ($1, $2, 0) \
             ON CONFLICT (user_key, currency) DO NOTHING",
        )
        .bind(user.as_str())
        .bind(currency.code())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        let amount: Decimal = sqlx::query_scalar(
            "SELECT amount FROM balances WHERE user_key = $1 AND currency = $2 FOR UPDATE",
        )
        .bind(user.as_str())
        .bind(currency.code())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        debug!(user_key = %user, currency = %currency, amount = %amount, "Row locked");
        Ok(amount)
    }

    async fn credit(&mut self, user: &UserKey, currency: Currency, amount: Decimal) -> Result<()> {
        // Decoding the new amount fails, and the transaction is dropped,
        // when NUMERIC has outgrown what Decimal can hold.
        let updated: Decimal = sqlx::query_scalar(
            "INSERT INTO balances (user_key, currency, amount) VALUES ($1, $2, $3) \
             ON CONFLICT (user_key, currency) \
             DO UPDATE SET amount = balances.amount + EXCLUDED.amount, updated_at = now() \
             RETURNING amount",
        )
        .bind(user.as_str())
        .bind(currency.code())
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        debug!(user_key = %user, currency = %currency, amount = %updated, "Row credited");
        Ok(())
    }

    async fn debit(&mut self, user: &UserKey, currency: Currency, amount: Decimal) -> Result<()> {
        let result = sqlx::query(
            "UPDATE balances SET amount = amount - $3, updated_at = now() \
             WHERE user_key = $1 AND currency = $2",
        )
        .bind(user.as_str())
        .bind(currency.code())
        .bind(amount)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() != 1 {
            return Err(WalletError::infrastructure(format!(
                "debit matched {} rows for ({user}, {currency})",
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }
}
