//! Node configuration.

use std::time::Duration;

use tally_ledger::DatabaseConfig;

/// Where account state is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// PostgreSQL through a connection pool.
    Postgres,
    /// Process memory. State is lost on restart.
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("Unknown storage backend: {}", other)),
        }
    }
}

/// Main node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Storage backend.
    pub storage: StorageBackend,
    /// Database pool settings, used with the postgres backend.
    pub database: DatabaseConfig,
    /// Log level.
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            storage: StorageBackend::Postgres,
            database: DatabaseConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(addr) = lookup("TALLY_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = lookup("TALLY_LISTEN_PORT") {
            config.listen_port = port
                .parse()
                .map_err(|_| format!("Invalid listen port: {}", port))?;
        }

        if let Some(storage) = lookup("TALLY_STORAGE") {
            config.storage = storage.parse()?;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            config.database.url = url;
        }

        if let Some(max) = lookup("TALLY_DB_MAX_CONNECTIONS") {
            config.database.max_connections = max
                .parse()
                .map_err(|_| format!("Invalid max connections: {}", max))?;
        }

        if let Some(secs) = lookup("TALLY_DB_ACQUIRE_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| format!("Invalid acquire timeout: {}", secs))?;
            config.database.acquire_timeout = Duration::from_secs(secs);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if self.storage == StorageBackend::Postgres {
            if self.database.url.is_empty() {
                return Err("Database URL cannot be empty".to_string());
            }
            if self.database.max_connections == 0 {
                return Err("Database pool needs at least one connection".to_string());
            }
        }

        Ok(())
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}
