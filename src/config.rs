//! Runtime configuration.
//!
//! Values come from built-in defaults, then an optional `ledger.toml`, then
//! the process environment (`DATABASE_URL`, `SERVER_PORT`, ...).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::LedgerError;

pub const DEFAULT_QUERY_LIMIT: u32 = 100;
pub const MAX_QUERY_LIMIT: u32 = 1000;
pub const DEFAULT_WRITER_QUEUE_DEPTH: usize = 1024;
pub const DEFAULT_ACTOR_LOOKUP_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub audit_default_query_limit: u32,
    pub audit_max_query_limit: u32,
    pub audit_writer_queue_depth: usize,
    pub audit_actor_lookup_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://audit-ledger.db".to_string(),
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            audit_default_query_limit: DEFAULT_QUERY_LIMIT,
            audit_max_query_limit: MAX_QUERY_LIMIT,
            audit_writer_queue_depth: DEFAULT_WRITER_QUEUE_DEPTH,
            audit_actor_lookup_timeout_ms: DEFAULT_ACTOR_LOOKUP_TIMEOUT_MS,
        }
    }
}

impl AppConfig {
    /// Load configuration from `ledger.toml` (if present) and the environment.
    pub fn load() -> Result<Self, LedgerError> {
        Self::load_with_file("ledger", false)
    }

    /// Load configuration from an explicit file, overridden by the environment.
    pub fn load_from(path: &Path) -> Result<Self, LedgerError> {
        let name = path.to_str().ok_or_else(|| {
            LedgerError::ConfigError(format!("Config path is not valid UTF-8: {:?}", path))
        })?;
        Self::load_with_file(name, true)
    }

    fn load_with_file(name: &str, required: bool) -> Result<Self, LedgerError> {
        let defaults = Self::default();

        let settings = config::Config::builder()
            .set_default("database_url", defaults.database_url)?
            .set_default("server_host", defaults.server_host)?
            .set_default("server_port", i64::from(defaults.server_port))?
            .set_default(
                "audit_default_query_limit",
                i64::from(defaults.audit_default_query_limit),
            )?
            .set_default(
                "audit_max_query_limit",
                i64::from(defaults.audit_max_query_limit),
            )?
            .set_default(
                "audit_writer_queue_depth",
                defaults.audit_writer_queue_depth as i64,
            )?
            .set_default(
                "audit_actor_lookup_timeout_ms",
                defaults.audit_actor_lookup_timeout_ms as i64,
            )?
            .add_source(config::File::with_name(name).required(required))
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;

        info!(
            "Configuration loaded (database: {}, listen: {}:{})",
            config.database_url, config.server_host, config.server_port
        );
        Ok(config)
    }

    /// Validate the loaded configuration
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.database_url.trim().is_empty() {
            return Err(LedgerError::ConfigError(
                "database_url must not be empty".to_string(),
            ));
        }

        if self.audit_max_query_limit == 0 {
            return Err(LedgerError::ConfigError(
                "audit_max_query_limit must be greater than zero".to_string(),
            ));
        }

        if self.audit_default_query_limit == 0
            || self.audit_default_query_limit > self.audit_max_query_limit
        {
            return Err(LedgerError::ConfigError(format!(
                "audit_default_query_limit ({}) must be between 1 and audit_max_query_limit ({})",
                self.audit_default_query_limit, self.audit_max_query_limit
            )));
        }

        if self.audit_writer_queue_depth == 0 {
            return Err(LedgerError::ConfigError(
                "audit_writer_queue_depth must be greater than zero".to_string(),
            ));
        }

        if self.audit_actor_lookup_timeout_ms == 0 {
            return Err(LedgerError::ConfigError(
                "audit_actor_lookup_timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn actor_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_actor_lookup_timeout_ms)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
