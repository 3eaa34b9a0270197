//! Configuration management for Novella Server

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Largest book file accepted by default (100 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Progress auto-save period in seconds
pub const DEFAULT_AUTOSAVE_SECS: u64 = 30;

/// Server pull period in seconds
pub const DEFAULT_SYNC_PULL_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub library: LibraryConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    pub source: LibrarySource,
    pub max_file_size: u64,
}

/// Where the book catalogue is served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibrarySource {
    /// SQLite-backed catalogue
    Database,
    /// Static sample books, for demos and local UI work
    Fixtures,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub autosave_interval_secs: u64,
    pub pull_interval_secs: u64,
}

impl SyncConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    pub fn pull_interval(&self) -> Duration {
        Duration::from_secs(self.pull_interval_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./novella.db".to_string(),
                max_connections: 5,
            },
            library: LibraryConfig {
                source: LibrarySource::Database,
                max_file_size: DEFAULT_MAX_FILE_SIZE,
            },
            sync: SyncConfig {
                autosave_interval_secs: DEFAULT_AUTOSAVE_SECS,
                pull_interval_secs: DEFAULT_SYNC_PULL_SECS,
            },
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Without `DATABASE_URL` the catalogue falls back to fixtures and the
    /// reading data lives in an in-memory database.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").ok();

        let source = match env::var("LIBRARY_SOURCE") {
            Ok(value) => match value.to_lowercase().as_str() {
                "database" | "db" => LibrarySource::Database,
                "fixtures" | "demo" => LibrarySource::Fixtures,
                other => {
                    return Err(ConfigError::InvalidValue(
                        "LIBRARY_SOURCE".to_string(),
                        other.to_string(),
                    ))
                }
            },
            Err(_) if database_url.is_none() => LibrarySource::Fixtures,
            Err(_) => LibrarySource::Database,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3000)?,
            },
            database: DatabaseConfig {
                url: database_url.unwrap_or_else(|| "sqlite::memory:".to_string()),
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            library: LibraryConfig {
                source,
                max_file_size: parse_var("MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
            },
            sync: SyncConfig {
                autosave_interval_secs: parse_interval("AUTOSAVE_INTERVAL_SECS", DEFAULT_AUTOSAVE_SECS)?,
                pull_interval_secs: parse_interval("SYNC_PULL_INTERVAL_SECS", DEFAULT_SYNC_PULL_SECS)?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// A period in seconds; zero is rejected
fn parse_interval(name: &str, default: u64) -> Result<u64, ConfigError> {
    match parse_var(name, default)? {
        0 => Err(ConfigError::InvalidValue(
            name.to_string(),
            "interval must be at least one second".to_string(),
        )),
        secs => Ok(secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reader_constants() {
        let config = Config::default();
        assert_eq!(config.library.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.sync.autosave_interval(), Duration::from_secs(30));
        assert_eq!(config.sync.pull_interval(), Duration::from_secs(60));
        assert_eq!(config.library.source, LibrarySource::Database);
    }

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let port: u16 = parse_var("NOVELLA_TEST_UNSET_PORT", 4000).unwrap();
        assert_eq!(port, 4000);
    }

    #[test]
    fn test_zero_interval_rejected() {
        std::env::set_var("NOVELLA_TEST_ZERO_INTERVAL", "0");
        let err = parse_interval("NOVELLA_TEST_ZERO_INTERVAL", 30).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "NOVELLA_TEST_ZERO_INTERVAL"));

        std::env::set_var("NOVELLA_TEST_SHORT_INTERVAL", "5");
        assert_eq!(parse_interval("NOVELLA_TEST_SHORT_INTERVAL", 30).unwrap(), 5);
        assert_eq!(parse_interval("NOVELLA_TEST_UNSET_INTERVAL", 30).unwrap(), 30);
    }
}
