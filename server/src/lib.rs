//! Wallet Server
//!
//! HTTP service exposing registration, login, balance reads, deposits,
//! withdrawals and currency exchange.

pub mod accounts;
pub mod app;
pub mod auth;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod middleware;
pub mod service;

pub use accounts::{AccountService, MemoryUserStore, PgUserStore, UserStore};
pub use app::{build_app, AppState};
pub use auth::{AuthState, TokenIssuer, TokenValidator};
pub use config::{RateSourceKind, ServerConfig};
pub use errors::ApiError;
pub use metrics::{Metrics, SharedMetrics};
pub use middleware::CorsState;
pub use service::WalletService;
