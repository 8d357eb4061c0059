//! Rate source error types.

use rust_decimal::Decimal;
use thiserror::Error;
use wallet_common::{CurrencyPair, WalletError};

/// Errors that can occur while resolving rates.
#[derive(Debug, Error)]
pub enum FxError {
    /// Rate not available for the requested currency pair.
    #[error("Rate not available for {0}")]
    RateNotAvailable(CurrencyPair),

    /// The source returned a zero or negative rate.
    #[error("Invalid rate {rate} for {pair}")]
    InvalidRate { pair: CurrencyPair, rate: Decimal },

    /// Provider returned an error.
    #[error("Rate provider error: {0}")]
    ProviderError(String),
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

impl FxError {
    /// Whether a later lookup may succeed without the source changing.
    pub fn is_transient(&self) -> bool {
        matches!(self, FxError::ProviderError(_))
    }
}

impl From<FxError> for WalletError {
    fn from(err: FxError) -> Self {
        WalletError::RateUnavailable {
            retryable: err.is_transient(),
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for FxError {
    fn from(err: sqlx::Error) -> Self {
        FxError::ProviderError(format!("database: {err}"))
    }
}

impl From<reqwest::Error> for FxError {
    fn from(err: reqwest::Error) -> Self {
        FxError::ProviderError(format!("http: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_common::Currency;

    #[test]
    fn test_only_provider_errors_are_transient() {
        let missing: WalletError =
            FxError::RateNotAvailable(CurrencyPair::new(Currency::Eur, Currency::Rub)).into();
        assert!(!missing.is_retryable());

        let outage: WalletError = FxError::ProviderError("http: timed out".into()).into();
        assert!(outage.is_retryable());
        assert_eq!(outage.error_code(), "RATE_UNAVAILABLE");
    }
}
