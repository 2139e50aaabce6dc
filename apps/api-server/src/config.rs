//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("sqlite") {
            Self::Sqlite
        } else {
            Self::Memory
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path (when using sqlite storage)
    pub db_path: Option<PathBuf>,
    /// Log format
    pub log_format: LogFormat,
    /// Country/state lookup endpoint
    pub countries_api_url: String,
    /// How long a successful country lookup is reused
    pub countries_cache_ttl: Duration,
    /// Fixed lookup envelope served instead of calling the endpoint (dev only)
    pub countries_override: Option<String>,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(var: F) -> Result<Self, ConfigError> {
        // Port
        let port: u16 = match var("PORT") {
            Some(s) => s.parse().map_err(|_| ConfigError {
                field: "PORT",
                message: format!("'{}' is not a valid port", s),
            })?,
            None => 3001,
        };

        // CORS allow origin
        let cors_origin_str = var("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Storage provider
        let storage_provider =
            StorageProvider::from_str(&var("STORAGE_PROVIDER").unwrap_or_else(|| "sqlite".into()));

        // DB path (for sqlite)
        let db_path = var("DB_PATH").filter(|s| !s.is_empty()).map(PathBuf::from);

        // Log format
        let log_format = LogFormat::from_str(&var("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        // Country lookup
        let countries_api_url = var("COUNTRIES_API_URL")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| countries_api::DEFAULT_URL.to_string());
        if !(countries_api_url.starts_with("http://") || countries_api_url.starts_with("https://")) {
            return Err(ConfigError {
                field: "COUNTRIES_API_URL",
                message: "must start with http:// or https://".into(),
            });
        }

        let countries_cache_ttl = match var("COUNTRIES_CACHE_TTL_SECS") {
            Some(s) => Duration::from_secs(s.parse().map_err(|_| ConfigError {
                field: "COUNTRIES_CACHE_TTL_SECS",
                message: format!("'{}' is not a number of seconds", s),
            })?),
            None => countries_api::DEFAULT_TTL,
        };

        let countries_override = var("COUNTRIES_API_OVERRIDE").filter(|s| !s.is_empty());

        Ok(Self {
            port,
            cors_allow_origin,
            storage_provider,
            db_path,
            log_format,
            countries_api_url,
            countries_cache_ttl,
            countries_override,
        })
    }

    /// Log warnings about settings that should not reach production.
    pub fn warn_if_ephemeral(&self) {
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!(
                "STORAGE_PROVIDER=memory: submitted users are lost when the server stops."
            );
        }
        if self.countries_override.is_some() {
            tracing::warn!(
                "COUNTRIES_API_OVERRIDE is set: serving a fixed country list instead of {}.",
                self.countries_api_url
            );
        }
    }
}
