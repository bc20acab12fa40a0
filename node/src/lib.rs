//! Tally Node
//!
//! Serves the ledger over HTTP. Each request runs on its own task and is
//! answered from that task, including when the ledger reports an error.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tracing::{info, warn};

use tally_common::Result;
use tally_ledger::{
    AccountService, InMemoryAccountRepository, PgAccountRepository, PgConnectionSource,
    TransactionalAccountService,
};

pub use config::{NodeConfig, StorageBackend};
pub use metrics::LedgerMetrics;
pub use routes::AppState;

/// Build the account service for the configured backend.
///
/// The postgres backend connects the pool and applies migrations first.
pub async fn connect_service(config: &NodeConfig) -> Result<Arc<dyn AccountService>> {
    match config.storage {
        StorageBackend::Postgres => {
            let source = PgConnectionSource::connect(&config.database).await?;
            source.migrate().await?;
            info!("Using postgres storage");
            let repository = PgAccountRepository::postgres(source);
            Ok(Arc::new(TransactionalAccountService::new(Arc::new(repository))))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage, accounts are lost on restart");
            let repository = InMemoryAccountRepository::in_memory();
            Ok(Arc::new(TransactionalAccountService::new(Arc::new(repository))))
        }
    }
}

/// Router over the given service.
pub fn build_app(service: Arc<dyn AccountService>) -> Router {
    routes::router(AppState::new(service))
}
