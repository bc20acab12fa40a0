//! Exact decimal amounts.
//!
//! Amounts enter the system as decimal strings and stay in [`Decimal`]
//! from there on. Nothing here goes through binary floating point.

use crate::{LedgerError, Result};
use rust_decimal::Decimal;
use thiserror::Error;

/// Failure to read an amount string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountParseError {
    /// Empty or blank input.
    #[error("amount is empty")]
    Empty,
    /// Not a decimal number, or not representable without rounding.
    #[error("amount {input:?} is not an exact decimal number")]
    NotExact { input: String },
}

/// Parse a decimal string without losing precision.
///
/// Inputs with more precision than [`Decimal`] can hold are rejected
/// rather than rounded.
pub fn parse_amount(input: &str) -> std::result::Result<Decimal, AmountParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountParseError::Empty);
    }
    Decimal::from_str_exact(trimmed).map_err(|_| AmountParseError::NotExact {
        input: input.to_string(),
    })
}

/// Reject negative amounts. Zero is allowed.
pub fn ensure_non_negative(amount: Decimal) -> Result<Decimal> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount { amount });
    }
    Ok(amount)
}

/// `balance + amount`, or `None` if the sum cannot be held exactly.
pub fn exact_add(balance: Decimal, amount: Decimal) -> Option<Decimal> {
    balance
        .checked_add(amount)
        .filter(|sum| keeps_scale(*sum, balance, amount))
}

/// `balance - amount`, or `None` if the difference cannot be held exactly.
pub fn exact_sub(balance: Decimal, amount: Decimal) -> Option<Decimal> {
    balance
        .checked_sub(amount)
        .filter(|difference| keeps_scale(*difference, balance, amount))
}

// Decimal arithmetic drops fractional digits once the mantissa is full.
fn keeps_scale(result: Decimal, a: Decimal, b: Decimal) -> bool {
    result.scale() >= a.scale().max(b.scale())
}
