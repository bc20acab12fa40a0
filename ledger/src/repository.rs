//! Transaction orchestration.
//!
//! [`AccountRepository`] is the only place where transactions are opened,
//! committed and rolled back. Business code receives a transaction-scoped
//! [`AccountOperations`] and never sees the connection itself.

use std::fmt;
use std::ops::DerefMut;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, debug_span, error, instrument, warn, Instrument};
use uuid::Uuid;

use tally_common::{AccountId, Result};

use crate::account::Account;
use crate::operations::{AccountOperations, OperationScope, OperationsFactory};

/// SQL transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Statement that applies this level to the current transaction.
    pub fn set_transaction_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Begun, block still running.
    Active,
    /// Changes are durable.
    Committed,
    /// Changes were discarded.
    RolledBack,
}

impl TransactionState {
    /// Check if the transaction has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }

    /// Only an active transaction can finish, and it finishes once.
    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        matches!(self, TransactionState::Active) && next.is_terminal()
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled_back",
        };
        f.write_str(name)
    }
}

/// Hands out exclusively owned connections.
///
/// Dropping a `Pooled` or `Transaction` handle returns the connection;
/// dropping an unfinished `Transaction` discards its changes.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    /// Connection the storage port runs against.
    type Connection: Send + 'static;
    /// Connection checked out without an explicit transaction.
    type Pooled: DerefMut<Target = Self::Connection> + Send + 'static;
    /// Connection inside an open transaction.
    type Transaction: DerefMut<Target = Self::Connection> + Send + 'static;

    /// Check out a connection for single-statement use.
    async fn acquire(&self) -> Result<Self::Pooled>;

    /// Check out a connection and open a transaction at `isolation`.
    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Transaction>;

    /// Make the transaction's changes durable.
    async fn commit(&self, transaction: Self::Transaction) -> Result<()>;

    /// Discard the transaction's changes.
    async fn rollback(&self, transaction: Self::Transaction) -> Result<()>;
}

/// Runs units of work against account storage.
pub struct AccountRepository<S, F> {
    source: S,
    factory: F,
}

impl<S, F> AccountRepository<S, F>
where
    S: ConnectionSource,
    F: OperationsFactory<S::Connection>,
{
    /// Create a repository over a connection source.
    pub fn new(source: S, factory: F) -> Self {
        Self { source, factory }
    }

    /// Get the underlying connection source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run `block` in a READ COMMITTED transaction.
    pub fn transaction<'a, T, B>(&'a self, operation: &'a str, block: B) -> BoxFuture<'a, Result<T>>
    where
        T: Send + 'a,
        B: for<'t> FnOnce(&'t mut dyn AccountOperations) -> BoxFuture<'t, Result<T>> + Send + 'a,
    {
        self.transaction_with_isolation(operation, IsolationLevel::default(), block)
    }

    /// Run `block` in a transaction at the given isolation level.
    ///
    /// Commits when the block returns `Ok`. On `Err` the transaction is
    /// rolled back and the block's error is returned as is; a failed
    /// rollback is logged, never reported in its place. The connection is
    /// released on every exit path, including a panic inside the block.
    pub fn transaction_with_isolation<'a, T, B>(
        &'a self,
        operation: &'a str,
        isolation: IsolationLevel,
        block: B,
    ) -> BoxFuture<'a, Result<T>>
    where
        T: Send + 'a,
        B: for<'t> FnOnce(&'t mut dyn AccountOperations) -> BoxFuture<'t, Result<T>> + Send + 'a,
    {
        let transaction_id = Uuid::new_v4();
        let span = debug_span!("transaction", %transaction_id, operation, %isolation);

        Box::pin(
            async move {
                debug!("Starting transaction");
                let mut transaction = self.source.begin(isolation).await?;
                let mut guard = TransactionGuard::new();

                let mut operations = self
                    .factory
                    .create(&mut *transaction, OperationScope::Transaction(isolation));
                let outcome = block(&mut *operations).await;
                drop(operations);

                match outcome {
                    Ok(value) => {
                        debug!("Committing transaction");
                        if let Err(e) = self.source.commit(transaction).await {
                            error!(error = %e, "Commit failed");
                            guard.finish(TransactionState::RolledBack);
                            return Err(e);
                        }
                        guard.finish(TransactionState::Committed);
                        Ok(value)
                    }
                    Err(e) => {
                        error!(error = %e, "Transaction failed, rolling back");
                        match self.source.rollback(transaction).await {
                            Ok(()) => warn!("Transaction rolled back"),
                            Err(rollback_error) => {
                                error!(error = %rollback_error, "Rollback failed")
                            }
                        }
                        guard.finish(TransactionState::RolledBack);
                        Err(e)
                    }
                }
            }
            .instrument(span),
        )
    }

    /// Look up an account outside any explicit transaction.
    #[instrument(skip(self))]
    pub async fn get_account_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        let mut connection = self.source.acquire().await?;
        let mut operations = self
            .factory
            .create(&mut *connection, OperationScope::Standalone);
        let account = operations.get_account_by_id(id).await?;
        Ok(account)
    }
}

/// Tracks the state of one open transaction.
///
/// Dropped while still active means the block panicked or the future was
/// cancelled; the connection drop discards the changes.
struct TransactionGuard {
    state: TransactionState,
}

impl TransactionGuard {
    fn new() -> Self {
        Self {
            state: TransactionState::Active,
        }
    }

    /// Move to a terminal state. Panics if the transaction already finished.
    fn finish(&mut self, next: TransactionState) {
        assert!(
            self.state.can_transition_to(next),
            "Invalid transaction state transition: {} -> {}",
            self.state,
            next
        );
        self.state = next;
        debug!(state = %next, "Transaction finished");
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!("Transaction abandoned before finishing, changes discarded");
        }
    }
}
