//! Storage port for account state.
//!
//! An [`AccountOperations`] value is always bound to one live connection.
//! When the connection belongs to a transaction every call joins that
//! transaction; nothing here commits or rolls back.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tally_common::{AccountId, Result};

use crate::account::Account;
use crate::repository::IsolationLevel;

/// Reads and writes a single account's state over one connection.
#[async_trait]
pub trait AccountOperations: Send {
    /// Insert an account with a zero balance and return its identity.
    async fn create_account(&mut self) -> Result<AccountId>;

    /// Look up an account. Absence is `Ok(None)`, not an error.
    async fn get_account_by_id(&mut self, id: AccountId) -> Result<Option<Account>>;

    /// Overwrite the balance of exactly one account.
    ///
    /// Fails with `BalanceNotUpdated` when no row matches. Panics if more
    /// than one row was changed.
    async fn update_account_balance(&mut self, id: AccountId, new_balance: Decimal) -> Result<()>;
}

/// How the connection handed to an [`OperationsFactory`] is being used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationScope {
    /// Single statements outside an explicit transaction.
    Standalone,
    /// Inside a transaction opened at the given isolation level.
    Transaction(IsolationLevel),
}

impl OperationScope {
    /// Whether calls run inside an explicit transaction.
    pub fn is_transactional(&self) -> bool {
        matches!(self, OperationScope::Transaction(_))
    }
}

/// Builds the storage port over a borrowed connection.
pub trait OperationsFactory<C>: Send + Sync {
    /// Bind a new port to `connection` for the given scope.
    fn create<'c>(
        &self,
        connection: &'c mut C,
        scope: OperationScope,
    ) -> Box<dyn AccountOperations + 'c>;
}

/// Panics when a single-row update touched more rows than one.
pub(crate) fn assert_single_row(id: AccountId, rows_affected: u64) {
    assert!(
        rows_affected <= 1,
        "More than one account updated for id {id}: {rows_affected} rows"
    );
}
