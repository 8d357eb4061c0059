//! Wallet Ledger Engine
//!
//! Per-user, per-currency balances with atomic deposit, withdraw and
//! exchange. Each operation is one unit of work that holds row locks on the
//! balances it touches until it commits or rolls back.

pub mod engine;
pub mod store;
pub mod memory;
pub mod postgres;

pub use engine::{Ledger, LedgerEngine, DEFAULT_OP_TIMEOUT};
pub use store::{BalanceStore, UnitOfWork};
pub use memory::MemoryBalanceStore;
pub use postgres::{init_schema, map_sqlx_error, PgBalanceStore};
