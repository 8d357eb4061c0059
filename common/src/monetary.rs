//! Monetary types for the wallet ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, WalletError};

/// Currencies the wallet can hold.
///
/// The set is closed. The derived ordering is the canonical lock order used
/// when a unit of work touches more than one balance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    Eur,
    Rub,
    Usd,
}

impl Currency {
    /// Every supported currency, in canonical order.
    pub const ALL: [Currency; 3] = [Currency::Eur, Currency::Rub, Currency::Usd];

    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Rub => "RUB",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = WalletError;

    /// Parse a 3-letter uppercase code. Lowercase input is rejected.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "EUR" => Ok(Currency::Eur),
            "RUB" => Ok(Currency::Rub),
            "USD" => Ok(Currency::Usd),
            other => Err(WalletError::validation(
                format!("unsupported currency: {other:?}"),
                "currency",
            )),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = WalletError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.code().to_string()
    }
}

/// An ordered currency pair: `from` is sold, `to` is received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub from: Currency,
    pub to: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(from: Currency, to: Currency) -> Self {
        Self { from, to }
    }

    /// Whether both legs are the same currency.
    pub fn is_degenerate(&self) -> bool {
        self.from == self.to
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

/// Per-currency balances of one account, zero-filled over [`Currency::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balances(BTreeMap<Currency, Decimal>);

impl Balances {
    /// All currencies at zero.
    pub fn zero() -> Self {
        Self(Currency::ALL.iter().map(|c| (*c, Decimal::ZERO)).collect())
    }

    /// Build from stored rows; currencies without a row stay at zero.
    pub fn from_rows(rows: impl IntoIterator<Item = (Currency, Decimal)>) -> Self {
        let mut balances = Self::zero();
        for (currency, amount) in rows {
            balances.0.insert(currency, amount);
        }
        balances
    }

    /// Amount held in one currency.
    pub fn get(&self, currency: Currency) -> Decimal {
        self.0.get(&currency).copied().unwrap_or(Decimal::ZERO)
    }

    /// Iterate over `(currency, amount)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Currency, Decimal)> + '_ {
        self.0.iter().map(|(c, a)| (*c, *a))
    }
}

impl Default for Balances {
    fn default() -> Self {
        Self::zero()
    }
}

/// Reject zero and negative amounts.
pub fn validate_amount(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::validation(
            format!("amount must be positive, got {amount}"),
            "amount",
        ));
    }
    Ok(amount.normalize())
}

/// Reject zero and negative rates.
pub fn validate_rate(rate: Decimal) -> Result<Decimal> {
    if rate <= Decimal::ZERO {
        return Err(WalletError::validation(
            format!("rate must be positive, got {rate}"),
            "rate",
        ));
    }
    Ok(rate)
}

/// Multiply an amount by a rate without rounding.
pub fn convert(amount: Decimal, rate: Decimal) -> Result<Decimal> {
    amount.checked_mul(rate).ok_or_else(|| {
        WalletError::validation(format!("{amount} * {rate} overflows"), "amount")
    })
}

/// Add a credit to a balance, rejecting results `Decimal` cannot represent.
pub fn checked_credit(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    balance.checked_add(amount).ok_or_else(|| {
        WalletError::validation(
            format!("crediting {amount} would overflow the balance"),
            "amount",
        )
    })
}
