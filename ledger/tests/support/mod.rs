//! Shared fixtures for ledger integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::oneshot;

use tally_common::{AccountId, Result};
use tally_ledger::memory::MemoryConnection;
use tally_ledger::{
    Account, AccountOperations, AccountRepository, AccountService, MemoryConnectionSource,
    MemoryOperationsFactory, OperationScope, OperationsFactory, TransactionalAccountService,
};

pub type MemoryService = TransactionalAccountService<MemoryConnectionSource, MemoryOperationsFactory>;

/// Service over a fresh in-memory store, plus the store for inspection.
pub fn memory_service() -> (Arc<MemoryService>, MemoryConnectionSource) {
    let source = MemoryConnectionSource::new();
    let repository = AccountRepository::new(source.clone(), MemoryOperationsFactory);
    (
        Arc::new(TransactionalAccountService::new(Arc::new(repository))),
        source,
    )
}

/// Open an account and deposit `balance` into it.
pub async fn funded_account(service: &dyn AccountService, balance: Decimal) -> Account {
    let account = service.create_account().await.unwrap();
    if !balance.is_zero() {
        service.deposit(account.id, balance).await.unwrap();
    }
    service.get_account_by_id(account.id).await.unwrap().unwrap()
}

/// Current balance of an existing account.
pub async fn balance_of(service: &dyn AccountService, id: AccountId) -> Decimal {
    service.get_account_by_id(id).await.unwrap().unwrap().balance
}

/// Suspends the first balance update of one account until released.
pub struct Pause {
    account_id: AccountId,
    reached: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

/// Test-side end of a [`Pause`].
pub struct PauseHandle {
    reached: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl Pause {
    pub fn new(account_id: AccountId) -> (Arc<Self>, PauseHandle) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let pause = Arc::new(Self {
            account_id,
            reached: Mutex::new(Some(reached_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        let handle = PauseHandle {
            reached: reached_rx,
            release: release_tx,
        };
        (pause, handle)
    }

    async fn hold(&self, id: AccountId) {
        if id != self.account_id {
            return;
        }
        let reached = self.reached.lock().take();
        if let Some(reached) = reached {
            let _ = reached.send(());
            let release = self.release.lock().take();
            if let Some(release) = release {
                let _ = release.await;
            }
        }
    }
}

impl PauseHandle {
    /// Wait until the paused transaction is about to write.
    pub async fn reached(&mut self) {
        (&mut self.reached).await.unwrap();
    }

    /// Let the paused transaction continue.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// Factory that wraps the in-memory port with a [`Pause`].
pub struct PausingFactory {
    pause: Arc<Pause>,
}

struct PausingOperations<'c> {
    inner: Box<dyn AccountOperations + 'c>,
    pause: Arc<Pause>,
}

#[async_trait]
impl AccountOperations for PausingOperations<'_> {
    async fn create_account(&mut self) -> Result<AccountId> {
        self.inner.create_account().await
    }

    async fn get_account_by_id(&mut self, id: AccountId) -> Result<Option<Account>> {
        self.inner.get_account_by_id(id).await
    }

    async fn update_account_balance(&mut self, id: AccountId, new_balance: Decimal) -> Result<()> {
        self.pause.hold(id).await;
        self.inner.update_account_balance(id, new_balance).await
    }
}

impl OperationsFactory<MemoryConnection> for PausingFactory {
    fn create<'c>(
        &self,
        connection: &'c mut MemoryConnection,
        scope: OperationScope,
    ) -> Box<dyn AccountOperations + 'c> {
        Box::new(PausingOperations {
            inner: MemoryOperationsFactory.create(connection, scope),
            pause: self.pause.clone(),
        })
    }
}

pub type PausingService = TransactionalAccountService<MemoryConnectionSource, PausingFactory>;

/// Service over `source` whose first update of `account_id` waits for the handle.
pub fn pausing_service(
    source: MemoryConnectionSource,
    account_id: AccountId,
) -> (Arc<PausingService>, PauseHandle) {
    let (pause, handle) = Pause::new(account_id);
    let repository = AccountRepository::new(source, PausingFactory { pause });
    (
        Arc::new(TransactionalAccountService::new(Arc::new(repository))),
        handle,
    )
}
