//! Operation counters for service monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use wallet_common::WalletError;
use wallet_fx::CacheStats;

/// Service metrics.
#[derive(Default)]
pub struct Metrics {
    /// HTTP requests received.
    pub requests_total: AtomicU64,
    /// Committed deposits.
    pub deposits: AtomicU64,
    /// Committed withdrawals.
    pub withdrawals: AtomicU64,
    /// Committed exchanges.
    pub exchanges: AtomicU64,
    /// Operations rejected for insufficient funds.
    pub insufficient_funds: AtomicU64,
    /// Requests rejected by validation.
    pub validation_failures: AtomicU64,
    /// Rate lookups that failed.
    pub rate_failures: AtomicU64,
    /// Datastore failures and timeouts.
    pub infrastructure_errors: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment requests received.
    pub fn request_received(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record committed deposit.
    pub fn deposit_committed(&self) {
        self.deposits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record committed withdrawal.
    pub fn withdrawal_committed(&self) {
        self.withdrawals.fetch_add(1, Ordering::Relaxed);
    }

    /// Record committed exchange.
    pub fn exchange_committed(&self) {
        self.exchanges.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed operation under its error kind.
    pub fn operation_failed(&self, err: &WalletError) {
        let counter = match err {
            WalletError::Validation { .. } => &self.validation_failures,
            WalletError::InsufficientFunds { .. } => &self.insufficient_funds,
            WalletError::RateUnavailable { .. } => &self.rate_failures,
            WalletError::Infrastructure { .. } | WalletError::Timeout(_) => {
                &self.infrastructure_errors
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            deposits: self.deposits.load(Ordering::Relaxed),
            withdrawals: self.withdrawals.load(Ordering::Relaxed),
            exchanges: self.exchanges.load(Ordering::Relaxed),
            insufficient_funds: self.insufficient_funds.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            rate_failures: self.rate_failures.load(Ordering::Relaxed),
            infrastructure_errors: self.infrastructure_errors.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self, cache: &CacheStats) -> String {
        let s = self.snapshot();
        let counters = [
            ("requests_total", "HTTP requests received", s.requests_total),
            ("deposits_total", "Committed deposits", s.deposits),
            ("withdrawals_total", "Committed withdrawals", s.withdrawals),
            ("exchanges_total", "Committed exchanges", s.exchanges),
            ("insufficient_funds_total", "Rejections for insufficient funds", s.insufficient_funds),
            ("validation_failures_total", "Rejected malformed requests", s.validation_failures),
            ("rate_failures_total", "Failed rate lookups", s.rate_failures),
            ("infrastructure_errors_total", "Datastore failures and timeouts", s.infrastructure_errors),
            ("rate_cache_hits_total", "Rate cache hits", cache.hits),
            ("rate_cache_misses_total", "Rate cache misses", cache.misses),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP wallet_{name} {help}\n# TYPE wallet_{name} counter\nwallet_{name} {value}\n\n"
            ));
        }
        out.push_str(&format!(
            "# HELP wallet_rate_cache_entries Cached rates\n# TYPE wallet_rate_cache_entries gauge\nwallet_rate_cache_entries {}\n",
            cache.valid_entries
        ));
        out
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub deposits: u64,
    pub withdrawals: u64,
    pub exchanges: u64,
    pub insufficient_funds: u64,
    pub validation_failures: u64,
    pub rate_failures: u64,
    pub infrastructure_errors: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
