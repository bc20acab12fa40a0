//! Account business rules.
//!
//! Every mutating operation runs as one transaction through
//! [`AccountRepository`]. Rejections happen before anything is written, or
//! roll back whatever the transaction already wrote.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use tally_common::{
    ensure_non_negative, exact_add, exact_sub, AccountId, AccountRole, LedgerError, Result,
};

use crate::account::{Account, Deposit, Transfer};
use crate::operations::{AccountOperations, OperationsFactory};
use crate::repository::{AccountRepository, ConnectionSource};

/// Ledger operations offered to callers.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Open an account with a zero balance.
    async fn create_account(&self) -> Result<Account>;

    /// Look up an account. Absence is `Ok(None)`.
    async fn get_account_by_id(&self, id: AccountId) -> Result<Option<Account>>;

    /// Add `amount` to an account.
    async fn deposit(&self, account_id: AccountId, amount: Decimal) -> Result<Deposit>;

    /// Move `amount` from one account to another.
    async fn transfer(
        &self,
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Decimal,
    ) -> Result<Transfer>;
}

/// [`AccountService`] backed by an [`AccountRepository`].
pub struct TransactionalAccountService<S, F> {
    repository: Arc<AccountRepository<S, F>>,
}

impl<S, F> TransactionalAccountService<S, F> {
    /// Create a service over a shared repository.
    pub fn new(repository: Arc<AccountRepository<S, F>>) -> Self {
        Self { repository }
    }
}

impl<S, F> Clone for TransactionalAccountService<S, F> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

#[async_trait]
impl<S, F> AccountService for TransactionalAccountService<S, F>
where
    S: ConnectionSource,
    F: OperationsFactory<S::Connection>,
{
    #[instrument(skip(self))]
    async fn create_account(&self) -> Result<Account> {
        let account = self
            .repository
            .transaction("create_account", |operations| Box::pin(open_account(operations)))
            .await?;

        info!(account_id = %account.id, "Account created");
        Ok(account)
    }

    async fn get_account_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        self.repository.get_account_by_id(id).await
    }

    #[instrument(skip(self, amount), fields(amount = %amount))]
    async fn deposit(&self, account_id: AccountId, amount: Decimal) -> Result<Deposit> {
        let deposit = self
            .repository
            .transaction("deposit", move |operations| {
                Box::pin(apply_deposit(operations, account_id, amount))
            })
            .await?;

        info!(account_id = %account_id, "Deposit completed");
        Ok(deposit)
    }

    #[instrument(skip(self, amount), fields(amount = %amount))]
    async fn transfer(
        &self,
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Decimal,
    ) -> Result<Transfer> {
        let transfer = self
            .repository
            .transaction("transfer", move |operations| {
                Box::pin(apply_transfer(
                    operations,
                    source_account_id,
                    destination_account_id,
                    amount,
                ))
            })
            .await?;

        info!(
            source_account_id = %source_account_id,
            destination_account_id = %destination_account_id,
            "Transfer completed"
        );
        Ok(transfer)
    }
}

async fn open_account(operations: &mut dyn AccountOperations) -> Result<Account> {
    let id = operations.create_account().await?;
    operations
        .get_account_by_id(id)
        .await?
        .ok_or(LedgerError::AccountCreation(id))
}

async fn apply_deposit(
    operations: &mut dyn AccountOperations,
    account_id: AccountId,
    amount: Decimal,
) -> Result<Deposit> {
    ensure_non_negative(amount)?;

    let account = operations
        .get_account_by_id(account_id)
        .await?
        .ok_or(LedgerError::not_found(account_id, AccountRole::Account))?;

    let new_balance = credited_balance(&account, amount)?;
    operations
        .update_account_balance(account.id, new_balance)
        .await?;

    Ok(Deposit { account_id, amount })
}

async fn apply_transfer(
    operations: &mut dyn AccountOperations,
    source_account_id: AccountId,
    destination_account_id: AccountId,
    amount: Decimal,
) -> Result<Transfer> {
    ensure_non_negative(amount)?;

    let source = operations
        .get_account_by_id(source_account_id)
        .await?
        .ok_or(LedgerError::not_found(source_account_id, AccountRole::Source))?;

    if !source.has_sufficient_funds(amount) {
        return Err(LedgerError::InsufficientBalance {
            account_id: source.id,
            required: amount,
            available: source.balance,
        });
    }

    let debited = exact_sub(source.balance, amount).ok_or(LedgerError::AmountOutOfRange {
        account_id: source.id,
        amount,
    })?;
    operations
        .update_account_balance(source.id, debited)
        .await?;

    // Read after the debit so a self-transfer credits the debited balance.
    let destination = operations
        .get_account_by_id(destination_account_id)
        .await?
        .ok_or(LedgerError::not_found(
            destination_account_id,
            AccountRole::Destination,
        ))?;

    let credited = credited_balance(&destination, amount)?;
    operations
        .update_account_balance(destination.id, credited)
        .await?;

    Ok(Transfer {
        source_account_id,
        destination_account_id,
        amount,
    })
}

fn credited_balance(account: &Account, amount: Decimal) -> Result<Decimal> {
    exact_add(account.balance, amount).ok_or(LedgerError::AmountOutOfRange {
        account_id: account.id,
        amount,
    })
}
