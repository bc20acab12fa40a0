//! Account entity and operation records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_common::AccountId;

/// A ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Storage-assigned identity.
    pub id: AccountId,
    /// Current balance, exact.
    pub balance: Decimal,
}

impl Account {
    /// Create an account with the given balance.
    pub fn new(id: AccountId, balance: Decimal) -> Self {
        Self { id, balance }
    }

    /// A freshly opened account holds exactly zero.
    pub fn opened(id: AccountId) -> Self {
        Self::new(id, Decimal::ZERO)
    }

    /// Check whether `amount` can be taken from this account.
    ///
    /// Taking the entire balance is allowed.
    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}

/// Result of a completed deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Credited account.
    pub account_id: AccountId,
    /// Deposited amount.
    pub amount: Decimal,
}

/// Result of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Debited account.
    pub source_account_id: AccountId,
    /// Credited account.
    pub destination_account_id: AccountId,
    /// Moved amount.
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_opened_account_is_empty() {
        let account = Account::opened(AccountId::new(1));
        assert_eq!(account.balance, Decimal::ZERO);
    }

    #[test]
    fn test_sufficient_funds_boundary() {
        let account = Account::new(AccountId::new(1), dec!(10.00));
        assert!(account.has_sufficient_funds(dec!(9.99)));
        assert!(account.has_sufficient_funds(dec!(10)));
        assert!(!account.has_sufficient_funds(dec!(10.01)));
    }
}
