//! Tally Ledger
//!
//! Accounts with exact decimal balances, deposits and transfers. Every
//! mutation runs inside a single storage transaction that either commits
//! completely or leaves no trace.

pub mod account;
pub mod operations;
pub mod repository;
pub mod service;
pub mod postgres;
pub mod memory;
pub mod schema;

pub use account::{Account, Deposit, Transfer};
pub use operations::{AccountOperations, OperationScope, OperationsFactory};
pub use repository::{AccountRepository, ConnectionSource, IsolationLevel, TransactionState};
pub use service::{AccountService, TransactionalAccountService};
pub use postgres::{DatabaseConfig, PgAccountRepository, PgConnectionSource, PgOperationsFactory};
pub use memory::{InMemoryAccountRepository, MemoryConnectionSource, MemoryOperationsFactory};
