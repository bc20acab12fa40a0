//! In-process account storage.
//!
//! Implements the same connection contract as the PostgreSQL adapter so the
//! service and orchestrator can run without a database. Transactions hold a
//! store-wide writer lock from `begin` until they finish, which makes every
//! transaction serializable. Writes are staged on the connection and only
//! reach the store on commit.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use tally_common::{AccountId, LedgerError, Result};

use crate::account::Account;
use crate::operations::{AccountOperations, OperationScope, OperationsFactory};
use crate::repository::{AccountRepository, ConnectionSource, IsolationLevel};

/// Shared account table.
struct MemoryStore {
    accounts: Mutex<BTreeMap<AccountId, Decimal>>,
    next_id: AtomicI64,
    writer: Arc<tokio::sync::Mutex<()>>,
}

impl MemoryStore {
    fn new() -> Self {
        Self {
            accounts: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            writer: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// A checked-out in-memory connection.
pub struct MemoryConnection {
    store: Arc<MemoryStore>,
    /// Uncommitted balances, present only inside a transaction.
    staged: BTreeMap<AccountId, Decimal>,
    /// Writer lock held for the lifetime of a transaction.
    writer: Option<OwnedMutexGuard<()>>,
}

impl MemoryConnection {
    fn in_transaction(&self) -> bool {
        self.writer.is_some()
    }

    fn read(&self, id: AccountId) -> Option<Decimal> {
        self.staged
            .get(&id)
            .copied()
            .or_else(|| self.store.accounts.lock().get(&id).copied())
    }

    fn write(&mut self, id: AccountId, balance: Decimal) {
        if self.in_transaction() {
            self.staged.insert(id, balance);
        } else {
            self.store.accounts.lock().insert(id, balance);
        }
    }
}

/// Owned handle to a [`MemoryConnection`].
pub struct MemoryHandle(Box<MemoryConnection>);

impl Deref for MemoryHandle {
    type Target = MemoryConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MemoryHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Connection source backed by process memory.
#[derive(Clone)]
pub struct MemoryConnectionSource {
    store: Arc<MemoryStore>,
}

impl MemoryConnectionSource {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Check that no transaction currently holds the store.
    pub fn is_idle(&self) -> bool {
        self.store.writer.try_lock().is_ok()
    }

    /// Number of committed accounts.
    pub fn account_count(&self) -> usize {
        self.store.accounts.lock().len()
    }

    fn connection(&self, writer: Option<OwnedMutexGuard<()>>) -> MemoryHandle {
        MemoryHandle(Box::new(MemoryConnection {
            store: self.store.clone(),
            staged: BTreeMap::new(),
            writer,
        }))
    }
}

impl Default for MemoryConnectionSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionSource for MemoryConnectionSource {
    type Connection = MemoryConnection;
    type Pooled = MemoryHandle;
    type Transaction = MemoryHandle;

    async fn acquire(&self) -> Result<MemoryHandle> {
        Ok(self.connection(None))
    }

    async fn begin(&self, isolation: IsolationLevel) -> Result<MemoryHandle> {
        let writer = self.store.writer.clone().lock_owned().await;
        debug!(%isolation, "Memory transaction started");
        Ok(self.connection(Some(writer)))
    }

    async fn commit(&self, mut transaction: MemoryHandle) -> Result<()> {
        let staged = std::mem::take(&mut transaction.staged);
        self.store.accounts.lock().extend(staged);
        Ok(())
    }

    async fn rollback(&self, mut transaction: MemoryHandle) -> Result<()> {
        transaction.staged.clear();
        Ok(())
    }
}

/// Storage port over a [`MemoryConnection`].
pub struct MemoryAccountOperations<'c> {
    connection: &'c mut MemoryConnection,
}

impl<'c> MemoryAccountOperations<'c> {
    pub fn new(connection: &'c mut MemoryConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl AccountOperations for MemoryAccountOperations<'_> {
    async fn create_account(&mut self) -> Result<AccountId> {
        let id = AccountId::new(self.connection.store.next_id.fetch_add(1, Ordering::SeqCst));
        self.connection.write(id, Decimal::ZERO);
        Ok(id)
    }

    async fn get_account_by_id(&mut self, id: AccountId) -> Result<Option<Account>> {
        Ok(self
            .connection
            .read(id)
            .map(|balance| Account::new(id, balance)))
    }

    async fn update_account_balance(&mut self, id: AccountId, new_balance: Decimal) -> Result<()> {
        // Keys are unique, so an update matches one account or none.
        if self.connection.read(id).is_none() {
            return Err(LedgerError::BalanceNotUpdated {
                account_id: id,
                new_balance,
            });
        }

        self.connection.write(id, new_balance);
        Ok(())
    }
}

/// Builds [`MemoryAccountOperations`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryOperationsFactory;

impl OperationsFactory<MemoryConnection> for MemoryOperationsFactory {
    fn create<'c>(
        &self,
        connection: &'c mut MemoryConnection,
        _scope: OperationScope,
    ) -> Box<dyn AccountOperations + 'c> {
        Box::new(MemoryAccountOperations::new(connection))
    }
}

/// Repository over in-process storage.
pub type InMemoryAccountRepository = AccountRepository<MemoryConnectionSource, MemoryOperationsFactory>;

impl InMemoryAccountRepository {
    /// Create a repository over a fresh, empty store.
    pub fn in_memory() -> Self {
        AccountRepository::new(MemoryConnectionSource::new(), MemoryOperationsFactory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_identities_start_at_one() {
        let source = MemoryConnectionSource::new();
        let mut connection = source.acquire().await.unwrap();
        let mut operations = MemoryAccountOperations::new(&mut connection);

        assert_eq!(operations.create_account().await.unwrap(), AccountId::new(1));
        assert_eq!(operations.create_account().await.unwrap(), AccountId::new(2));
        assert_eq!(
            operations.get_account_by_id(AccountId::new(2)).await.unwrap(),
            Some(Account::opened(AccountId::new(2)))
        );
    }

    #[tokio::test]
    async fn test_staged_writes_only_visible_after_commit() {
        let source = MemoryConnectionSource::new();
        let mut transaction = source.begin(IsolationLevel::default()).await.unwrap();
        let id = {
            let mut operations = MemoryAccountOperations::new(&mut transaction);
            let id = operations.create_account().await.unwrap();
            operations.update_account_balance(id, dec!(10.00)).await.unwrap();
            id
        };

        assert_eq!(source.account_count(), 0);
        assert!(!source.is_idle());

        source.commit(transaction).await.unwrap();
        assert!(source.is_idle());

        let mut connection = source.acquire().await.unwrap();
        let account = MemoryAccountOperations::new(&mut connection)
            .get_account_by_id(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.balance, dec!(10.00));
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let source = MemoryConnectionSource::new();
        {
            let mut transaction = source.begin(IsolationLevel::default()).await.unwrap();
            MemoryAccountOperations::new(&mut transaction)
                .create_account()
                .await
                .unwrap();
        }

        assert!(source.is_idle());
        assert_eq!(source.account_count(), 0);
    }

    #[test]
    fn test_update_of_missing_account() {
        let source = MemoryConnectionSource::new();
        let result = tokio_test::block_on(async {
            let mut connection = source.acquire().await.unwrap();
            MemoryAccountOperations::new(&mut connection)
                .update_account_balance(AccountId::new(5), dec!(1))
                .await
        });

        assert_eq!(
            result,
            Err(LedgerError::BalanceNotUpdated {
                account_id: AccountId::new(5),
                new_balance: dec!(1),
            })
        );
    }
}
