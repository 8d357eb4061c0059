//! Identifier types for wallet entities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, WalletError};

/// Maximum length accepted for a user key.
pub const MAX_USER_KEY_LEN: usize = 128;

/// Opaque key identifying an account holder.
///
/// The key is issued by the identity layer and is stable for the lifetime of
/// the account. An account is the set of balance rows sharing one key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKey(String);

impl UserKey {
    /// Create a user key without validation.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Create a user key, rejecting empty or oversized input.
    pub fn parse(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(WalletError::validation("user key must not be empty", "user_id"));
        }
        if trimmed.len() > MAX_USER_KEY_LEN {
            return Err(WalletError::validation(
                format!("user key exceeds {MAX_USER_KEY_LEN} characters"),
                "user_id",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for UserKey {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_key_parse_trims() {
        let key = UserKey::parse("  42 ").unwrap();
        assert_eq!(key.as_str(), "42");
    }

    #[test]
    fn test_user_key_rejects_empty() {
        assert!(UserKey::parse("   ").is_err());
        assert!(UserKey::parse("x".repeat(MAX_USER_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_integer_ids_become_keys() {
        assert_eq!(UserKey::from(7_i64), UserKey::new("7"));
    }
}
