//! Process configuration.
//!
//! Every setting can be given as a command-line flag or an environment
//! variable, and falls back to a default.

use crate::db::PoolSettings;
use crate::error::AppError;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "reviewer-assign")]
#[command(about = "Assigns code reviewers to team pull requests")]
#[command(version)]
pub struct Config {
    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "reviewer-assign.db")]
    pub database_path: PathBuf,

    /// Address to bind the HTTP server to
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind the HTTP server to
    #[arg(long, env = "SERVER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Log level filter (error, warn, info, debug, trace); RUST_LOG overrides
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum number of pooled database connections
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Timeout in seconds for acquiring a connection and for each engine operation
    #[arg(long, env = "STORAGE_TIMEOUT_SECS", default_value_t = 10)]
    pub storage_timeout_secs: u64,
}

impl Config {
    /// Parse from the process arguments and environment, then validate.
    pub fn load() -> Result<Self, AppError> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_connections == 0 {
            return Err(AppError::invalid_input_field(
                "must be at least 1",
                "max_connections",
            ));
        }
        if self.storage_timeout_secs == 0 {
            return Err(AppError::invalid_input_field(
                "must be at least 1 second",
                "storage_timeout_secs",
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_connections,
            acquire_timeout: self.storage_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "reviewer-assign",
            "--database-path",
            "/tmp/x.db",
            "--port",
            "9000",
            "--storage-timeout-secs",
            "3",
        ])
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.bind_addr().port(), 9000);
        assert_eq!(config.pool_settings().acquire_timeout, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config =
            Config::try_parse_from(["reviewer-assign", "--storage-timeout-secs", "0"]).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));
    }

    #[test]
    fn test_invalid_host_fails_to_parse() {
        assert!(Config::try_parse_from(["reviewer-assign", "--host", "not-an-ip"]).is_err());
    }
}
