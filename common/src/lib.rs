//! Wallet Common Types
//!
//! This crate contains shared types used across the wallet ledger,
//! including user keys, currencies, balances and the error taxonomy.

pub mod identifiers;
pub mod monetary;
pub mod error;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
