//! In-memory balance store.
//!
//! Mirrors the row-lock semantics of the Postgres store: every row has an
//! async mutex that a unit of work holds until commit or drop, writes are
//! staged per unit of work, and readers see only committed amounts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use wallet_common::{checked_credit, Currency, Result, UserKey, WalletError};

use crate::store::{BalanceStore, UnitOfWork};

type RowKey = (UserKey, Currency);

#[derive(Default)]
struct Row {
    lock: Arc<Mutex<()>>,
    amount: RwLock<Decimal>,
}

/// Balance store backed by a concurrent map.
#[derive(Clone, Default)]
pub struct MemoryBalanceStore {
    rows: Arc<DashMap<RowKey, Arc<Row>>>,
    /// Held exclusively while a commit publishes its rows.
    commit_gate: Arc<RwLock<()>>,
}

impl MemoryBalanceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of materialized rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row(&self, user: &UserKey, currency: Currency) -> Arc<Row> {
        self.rows
            .entry((user.clone(), currency))
            .or_default()
            .clone()
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    type Tx = MemoryUnitOfWork;

    fn name(&self) -> &str {
        "memory"
    }

    async fn begin(&self) -> Result<MemoryUnitOfWork> {
        Ok(MemoryUnitOfWork {
            store: self.clone(),
            held: HashMap::new(),
        })
    }

    async fn read_all(&self, user: &UserKey) -> Result<Vec<(Currency, Decimal)>> {
        let _gate = self.commit_gate.read();
        let rows = Currency::ALL
            .iter()
            .filter_map(|currency| {
                self.rows
                    .get(&(user.clone(), *currency))
                    .map(|row| (*currency, *row.amount.read()))
            })
            .collect();
        Ok(rows)
    }
}

struct Held {
    row: Arc<Row>,
    _guard: OwnedMutexGuard<()>,
    staged: Decimal,
}

/// Unit of work over a [`MemoryBalanceStore`].
pub struct MemoryUnitOfWork {
    store: MemoryBalanceStore,
    held: HashMap<RowKey, Held>,
}

impl MemoryUnitOfWork {
    fn held_mut(&mut self, user: &UserKey, currency: Currency) -> Result<&mut Held> {
        self.held
            .get_mut(&(user.clone(), currency))
            .ok_or_else(|| {
                WalletError::infrastructure(format!(
                    "row ({user}, {currency}) is not locked by this unit of work"
                ))
            })
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock(&mut self, user: &UserKey, currency: Currency) -> Result<Decimal> {
        let key = (user.clone(), currency);
        if let Some(held) = self.held.get(&key) {
            return Ok(held.staged);
        }

        // Clone the row out of the map so no shard lock is held while waiting.
        let row = self.store.row(user, currency);
        let guard = row.lock.clone().lock_owned().await;
        let staged = *row.amount.read();
        self.held.insert(
            key,
            Held {
                row,
                _guard: guard,
                staged,
            },
        );
        Ok(staged)
    }

    async fn credit(&mut self, user: &UserKey, currency: Currency, amount: Decimal) -> Result<()> {
        self.lock(user, currency).await?;
        let held = self.held_mut(user, currency)?;
        held.staged = checked_credit(held.staged, amount)?;
        Ok(())
    }

    async fn debit(&mut self, user: &UserKey, currency: Currency, amount: Decimal) -> Result<()> {
        let held = self.held_mut(user, currency)?;
        let next = held.staged - amount;
        if next < Decimal::ZERO {
            return Err(WalletError::infrastructure(format!(
                "balance ({user}, {currency}) would become negative"
            )));
        }
        held.staged = next;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        {
            let _gate = self.store.commit_gate.write();
            for held in self.held.values() {
                *held.row.amount.write() = held.staged;
            }
        }
        // Row locks release when `self.held` drops.
        Ok(())
    }
}
