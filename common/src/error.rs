//! Error types for wallet operations.

use crate::Currency;
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for wallet operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    /// Malformed input: non-positive amount, unknown currency, bad key.
    #[error("Validation failed on {field}: {message}")]
    Validation { message: String, field: String },

    /// The source balance cannot cover the requested debit.
    #[error("Insufficient funds in {currency}: required {required}, available {available}")]
    InsufficientFunds {
        currency: Currency,
        required: Decimal,
        available: Decimal,
    },

    /// No rate for the pair, or the rate source failed.
    ///
    /// `retryable` is set for source failures; a pair the source does not
    /// hold stays missing until the source changes.
    #[error("Rate unavailable: {message}")]
    RateUnavailable { message: String, retryable: bool },

    /// Datastore or transport failure.
    #[error("Infrastructure error: {message}")]
    Infrastructure { message: String, retryable: bool },

    /// The unit of work did not finish in time and was rolled back.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl WalletError {
    /// Create a validation error for a named input field.
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        WalletError::Validation {
            message: message.into(),
            field: field.into(),
        }
    }

    /// Create a non-retryable infrastructure error.
    pub fn infrastructure(message: impl Into<String>) -> Self {
        WalletError::Infrastructure {
            message: message.into(),
            retryable: false,
        }
    }

    /// Check if the caller may retry the operation as-is.
    ///
    /// The ledger itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            WalletError::Infrastructure { retryable, .. }
            | WalletError::RateUnavailable { retryable, .. } => *retryable,
            WalletError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            WalletError::Validation { .. } => "VALIDATION_ERROR",
            WalletError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            WalletError::RateUnavailable { .. } => "RATE_UNAVAILABLE",
            WalletError::Infrastructure { .. } => "INFRASTRUCTURE_ERROR",
            WalletError::Timeout(_) => "TIMEOUT",
        }
    }
}

/// Result type alias for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes() {
        let err = WalletError::InsufficientFunds {
            currency: Currency::Usd,
            required: dec!(80),
            available: dec!(20),
        };
        assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Insufficient funds in USD: required 80, available 20"
        );
    }

    #[test]
    fn test_retryable_infrastructure() {
        let err = WalletError::Infrastructure {
            message: "lock timeout".into(),
            retryable: true,
        };
        assert!(err.is_retryable());
        assert!(!WalletError::infrastructure("pool closed").is_retryable());
        assert!(WalletError::Timeout("withdraw".into()).is_retryable());
    }

    #[test]
    fn test_missing_rate_is_not_retryable() {
        let missing = WalletError::RateUnavailable {
            message: "no rate for EUR/RUB".into(),
            retryable: false,
        };
        assert_eq!(missing.error_code(), "RATE_UNAVAILABLE");
        assert!(!missing.is_retryable());

        let outage = WalletError::RateUnavailable {
            message: "connection refused".into(),
            retryable: true,
        };
        assert!(outage.is_retryable());
    }
}
