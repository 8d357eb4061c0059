//! Wallet FX Rates
//!
//! Exchange rate resolution for the wallet ledger.
//!
//! # Features
//!
//! - Rate sources backed by the `exchange_rates` table, a remote service,
//!   or an in-process table
//! - Read-through rate caching with a configurable freshness window
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wallet_fx::{CachingRateSource, PgRateSource, RateCache, RateSource};
//! use wallet_common::{Currency, CurrencyPair};
//!
//! let source = CachingRateSource::new(Arc::new(PgRateSource::new(pool)), Arc::new(RateCache::new()));
//! let rate = source.lookup_rate(&CurrencyPair::new(Currency::Usd, Currency::Eur)).await?;
//! ```

pub mod provider;
pub mod postgres;
pub mod remote;
pub mod cache;
pub mod caching;
pub mod error;

pub use provider::{RateSource, StaticRateSource};
pub use postgres::PgRateSource;
pub use remote::HttpRateSource;
pub use cache::{CacheStats, RateCache, RateCacheConfig, DEFAULT_RATE_TTL};
pub use caching::CachingRateSource;
pub use error::{FxError, FxResult};
