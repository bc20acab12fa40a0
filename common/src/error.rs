//! Error types for ledger operations.

use crate::AccountId;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Role an account plays in the operation that failed to find it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRole {
    /// Account addressed directly (deposit, lookup).
    Account,
    /// Account funds are taken from.
    Source,
    /// Account funds are credited to.
    Destination,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            AccountRole::Account => "account",
            AccountRole::Source => "source account",
            AccountRole::Destination => "destination account",
        };
        f.write_str(role)
    }
}

/// Broad class of a [`LedgerError`], used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input rejected before any mutation.
    Validation,
    /// Referenced account does not exist.
    NotFound,
    /// Business rule rejected the operation.
    Conflict,
    /// Storage returned something that should be impossible.
    Consistency,
    /// Connection or transaction infrastructure failure.
    Storage,
}

/// Main error type for ledger operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Amount is negative.
    #[error("Invalid amount: {amount} must not be negative")]
    InvalidAmount { amount: Decimal },

    /// Applying the amount would leave a balance that cannot be held exactly.
    #[error("Amount {amount} cannot be applied exactly to the balance of account {account_id}")]
    AmountOutOfRange {
        account_id: AccountId,
        amount: Decimal,
    },

    /// Account does not exist.
    #[error("The {role} with id {account_id} does not exist")]
    AccountNotFound {
        account_id: AccountId,
        role: AccountRole,
    },

    /// Source balance is lower than the requested amount.
    #[error("Insufficient balance on account {account_id}: required {required}, available {available}")]
    InsufficientBalance {
        account_id: AccountId,
        required: Decimal,
        available: Decimal,
    },

    /// A freshly created account could not be read back.
    #[error("Account {0} was created but could not be read back")]
    AccountCreation(AccountId),

    /// Balance update matched no row.
    #[error("Balance of account {account_id} was not updated to {new_balance}: account does not exist")]
    BalanceNotUpdated {
        account_id: AccountId,
        new_balance: Decimal,
    },

    /// Serialization failure or deadlock reported by storage.
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Shorthand for a missing account in the given role.
    pub fn not_found(account_id: AccountId, role: AccountRole) -> Self {
        LedgerError::AccountNotFound { account_id, role }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount { .. } | LedgerError::AmountOutOfRange { .. } => {
                ErrorKind::Validation
            }
            LedgerError::AccountNotFound { .. } => ErrorKind::NotFound,
            LedgerError::InsufficientBalance { .. } => ErrorKind::Conflict,
            LedgerError::AccountCreation(_) | LedgerError::BalanceNotUpdated { .. } => {
                ErrorKind::Consistency
            }
            LedgerError::TransactionConflict(_) | LedgerError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Check if re-running the whole operation may succeed.
    ///
    /// Nothing in the ledger retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::TransactionConflict(_))
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount { .. } => "INVALID_AMOUNT",
            LedgerError::AmountOutOfRange { .. } => "AMOUNT_OUT_OF_RANGE",
            LedgerError::AccountNotFound { role, .. } => match role {
                AccountRole::Account => "ACCOUNT_NOT_FOUND",
                AccountRole::Source => "SOURCE_ACCOUNT_NOT_FOUND",
                AccountRole::Destination => "DESTINATION_ACCOUNT_NOT_FOUND",
            },
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::AccountCreation(_) => "ACCOUNT_CREATION_FAILED",
            LedgerError::BalanceNotUpdated { .. } => "BALANCE_NOT_UPDATED",
            LedgerError::TransactionConflict(_) => "TRANSACTION_CONFLICT",
            LedgerError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Input field that caused the rejection, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            LedgerError::InvalidAmount { .. }
            | LedgerError::AmountOutOfRange { .. }
            | LedgerError::InsufficientBalance { .. } => Some("amount"),
            LedgerError::AccountNotFound {
                role: AccountRole::Destination,
                ..
            } => Some("destinationAccountId"),
            _ => None,
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
