//! PostgreSQL account storage.
//!
//! Balances live in an unconstrained `NUMERIC` column and cross the driver
//! boundary as `rust_decimal::Decimal` in fixed-point binary form.
//!
//! ## Lost updates
//!
//! Reads issued inside a transaction take the row lock (`SELECT ... FOR UPDATE`).
//! A second transaction touching the same account blocks on that read until the
//! first one finishes, then sees the committed balance. This keeps
//! read-balance-then-write-balance atomic per account under READ COMMITTED.
//! Standalone reads take no lock.
//!
//! ## Error mapping
//!
//! | SQLx error | SQLSTATE | LedgerError |
//! |------------|----------|-------------|
//! | Database (serialization failure) | `40001` | `TransactionConflict` |
//! | Database (deadlock detected) | `40P01` | `TransactionConflict` |
//! | Anything else | | `Storage` |

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use tracing::{info, instrument};

use tally_common::{AccountId, LedgerError, Result};

use crate::account::Account;
use crate::operations::{assert_single_row, AccountOperations, OperationScope, OperationsFactory};
use crate::repository::{AccountRepository, ConnectionSource, IsolationLevel};
use crate::schema::MIGRATIONS;

const INSERT_ACCOUNT: &str = "INSERT INTO accounts (balance) VALUES (0) RETURNING id";
const SELECT_ACCOUNT: &str = "SELECT id, balance FROM accounts WHERE id = $1";
const SELECT_ACCOUNT_FOR_UPDATE: &str = "SELECT id, balance FROM accounts WHERE id = $1 FOR UPDATE";
const UPDATE_BALANCE: &str = "UPDATE accounts SET balance = $1 WHERE id = $2";

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
    /// How long to wait for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/tally".to_string(),
            max_connections: 30,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection source over a `PgPool`.
#[derive(Debug, Clone)]
pub struct PgConnectionSource {
    pool: PgPool,
}

impl PgConnectionSource {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool with the given settings.
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        info!("Database pool ready");
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations. Safe to run repeatedly.
    pub async fn migrate(&self) -> Result<()> {
        for (name, sql) in MIGRATIONS {
            self.pool
                .execute(*sql)
                .await
                .map_err(|e| map_sqlx_error(name, e))?;
            info!(migration = %name, "Migration applied");
        }
        Ok(())
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionSource for PgConnectionSource {
    type Connection = PgConnection;
    type Pooled = PoolConnection<Postgres>;
    type Transaction = sqlx::Transaction<'static, Postgres>;

    async fn acquire(&self) -> Result<Self::Pooled> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))
    }

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Transaction> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // Must be the first statement of the transaction.
        (&mut *transaction)
            .execute(isolation.set_transaction_sql())
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        Ok(transaction)
    }

    async fn commit(&self, transaction: Self::Transaction) -> Result<()> {
        transaction
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(&self, transaction: Self::Transaction) -> Result<()> {
        transaction
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Storage port over a borrowed PostgreSQL connection.
pub struct PgAccountOperations<'c> {
    connection: &'c mut PgConnection,
    lock_rows: bool,
}

impl<'c> PgAccountOperations<'c> {
    /// Bind to a connection. `lock_rows` makes reads take the row lock.
    pub fn new(connection: &'c mut PgConnection, lock_rows: bool) -> Self {
        Self {
            connection,
            lock_rows,
        }
    }
}

#[async_trait]
impl AccountOperations for PgAccountOperations<'_> {
    async fn create_account(&mut self) -> Result<AccountId> {
        let id: i64 = sqlx::query_scalar(INSERT_ACCOUNT)
            .fetch_one(&mut *self.connection)
            .await
            .map_err(|e| map_sqlx_error("create_account", e))?;

        Ok(AccountId::new(id))
    }

    async fn get_account_by_id(&mut self, id: AccountId) -> Result<Option<Account>> {
        let row: Option<(i64, Decimal)> = sqlx::query_as(select_sql(self.lock_rows))
            .bind(id.value())
            .fetch_optional(&mut *self.connection)
            .await
            .map_err(|e| map_sqlx_error("get_account_by_id", e))?;

        Ok(row.map(|(id, balance)| Account::new(AccountId::new(id), balance)))
    }

    async fn update_account_balance(&mut self, id: AccountId, new_balance: Decimal) -> Result<()> {
        let rows_affected = sqlx::query(UPDATE_BALANCE)
            .bind(new_balance)
            .bind(id.value())
            .execute(&mut *self.connection)
            .await
            .map_err(|e| map_sqlx_error("update_account_balance", e))?
            .rows_affected();

        if rows_affected == 0 {
            return Err(LedgerError::BalanceNotUpdated {
                account_id: id,
                new_balance,
            });
        }
        assert_single_row(id, rows_affected);

        Ok(())
    }
}

/// Builds [`PgAccountOperations`], locking rows inside transactions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgOperationsFactory;

impl OperationsFactory<PgConnection> for PgOperationsFactory {
    fn create<'c>(
        &self,
        connection: &'c mut PgConnection,
        scope: OperationScope,
    ) -> Box<dyn AccountOperations + 'c> {
        Box::new(PgAccountOperations::new(connection, scope.is_transactional()))
    }
}

/// Repository over PostgreSQL.
pub type PgAccountRepository = AccountRepository<PgConnectionSource, PgOperationsFactory>;

impl PgAccountRepository {
    /// Create a repository over an open connection source.
    pub fn postgres(source: PgConnectionSource) -> Self {
        AccountRepository::new(source, PgOperationsFactory)
    }
}

/// Account read, taking the row lock when `lock_rows` is set.
fn select_sql(lock_rows: bool) -> &'static str {
    if lock_rows {
        SELECT_ACCOUNT_FOR_UPDATE
    } else {
        SELECT_ACCOUNT
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => LedgerError::TransactionConflict(msg),
                _ => LedgerError::Storage(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            LedgerError::Storage(format!("timed out waiting for a connection in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            LedgerError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => LedgerError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
