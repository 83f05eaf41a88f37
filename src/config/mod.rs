//! Configuration management
//!
//! This module handles loading and parsing configuration for the blog server
//! and the client sync layer. Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Client sync layer configuration
    #[serde(default)]
    pub client: ClientConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/pediablog.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

/// Client sync layer configuration.
///
/// Durations are stored as plain integers so the YAML stays readable;
/// use the accessor methods to get [`Duration`] values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the blog API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Transport-level retries for network errors and 404/500/503
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_stale_time_secs")]
    pub stale_time_secs: u64,
    #[serde(default = "default_cache_time_secs")]
    pub cache_time_secs: u64,
    #[serde(default = "default_query_retries")]
    pub query_retries: u32,
    #[serde(default = "default_query_max_delay_ms")]
    pub query_max_delay_ms: u64,
    #[serde(default = "default_mutation_retries")]
    pub mutation_retries: u32,
    #[serde(default = "default_mutation_max_delay_ms")]
    pub mutation_max_delay_ms: u64,
    /// How long the recent-error flag stays set after a query error
    #[serde(default = "default_error_cooldown_secs")]
    pub error_cooldown_secs: u64,
    /// Refocus delay while the recent-error flag is set
    #[serde(default = "default_focus_delay_secs")]
    pub focus_delay_secs: u64,
    /// Lightweight endpoint used to check reachability
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_reconnect_retry_secs")]
    pub reconnect_retry_secs: u64,
    #[serde(default = "default_online_settle_secs")]
    pub online_settle_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            stale_time_secs: default_stale_time_secs(),
            cache_time_secs: default_cache_time_secs(),
            query_retries: default_query_retries(),
            query_max_delay_ms: default_query_max_delay_ms(),
            mutation_retries: default_mutation_retries(),
            mutation_max_delay_ms: default_mutation_max_delay_ms(),
            error_cooldown_secs: default_error_cooldown_secs(),
            focus_delay_secs: default_focus_delay_secs(),
            probe_path: default_probe_path(),
            probe_timeout_secs: default_probe_timeout_secs(),
            probe_interval_secs: default_probe_interval_secs(),
            reconnect_retry_secs: default_reconnect_retry_secs(),
            online_settle_secs: default_online_settle_secs(),
        }
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_stale_time_secs() -> u64 {
    5 * 60
}

fn default_cache_time_secs() -> u64 {
    2 * 60 * 60
}

fn default_query_retries() -> u32 {
    3
}

fn default_query_max_delay_ms() -> u64 {
    30_000
}

fn default_mutation_retries() -> u32 {
    2
}

fn default_mutation_max_delay_ms() -> u64 {
    10_000
}

fn default_error_cooldown_secs() -> u64 {
    30
}

fn default_focus_delay_secs() -> u64 {
    5
}

fn default_probe_path() -> String {
    "/posts?limit=1".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_probe_interval_secs() -> u64 {
    3 * 60
}

fn default_reconnect_retry_secs() -> u64 {
    5
}

fn default_online_settle_secs() -> u64 {
    2
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }

    pub fn cache_time(&self) -> Duration {
        Duration::from_secs(self.cache_time_secs)
    }

    pub fn query_max_delay(&self) -> Duration {
        Duration::from_millis(self.query_max_delay_ms)
    }

    pub fn mutation_max_delay(&self) -> Duration {
        Duration::from_millis(self.mutation_max_delay_ms)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    pub fn focus_delay(&self) -> Duration {
        Duration::from_secs(self.focus_delay_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn reconnect_retry(&self) -> Duration {
        Duration::from_secs(self.reconnect_retry_secs)
    }

    pub fn online_settle(&self) -> Duration {
        Duration::from_secs(self.online_settle_secs)
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - PEDIABLOG_SERVER_HOST
    /// - PEDIABLOG_SERVER_PORT
    /// - PEDIABLOG_SERVER_CORS_ORIGIN
    /// - PEDIABLOG_DATABASE_DRIVER
    /// - PEDIABLOG_DATABASE_URL
    /// - PEDIABLOG_CACHE_TTL_SECONDS
    /// - PEDIABLOG_AUTH_SESSION_DAYS
    /// - PEDIABLOG_CLIENT_API_BASE_URL
    /// - PEDIABLOG_CLIENT_MAX_RETRIES
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the server or client unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.session_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_days must be positive".to_string(),
            ));
        }
        if self.client.api_base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "client.api_base_url cannot be empty".to_string(),
            ));
        }
        if !self.client.probe_path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "client.probe_path must start with '/': {}",
                self.client.probe_path
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("PEDIABLOG_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PEDIABLOG_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("PEDIABLOG_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("PEDIABLOG_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("PEDIABLOG_DATABASE_URL") {
            self.database.url = url;
        }

        // Cache configuration
        if let Ok(ttl) = std::env::var("PEDIABLOG_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        // Auth configuration
        if let Ok(days) = std::env::var("PEDIABLOG_AUTH_SESSION_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                if days > 0 {
                    self.auth.session_days = days;
                }
            }
        }

        // Client configuration
        if let Ok(url) = std::env::var("PEDIABLOG_CLIENT_API_BASE_URL") {
            self.client.api_base_url = url;
        }
        if let Ok(retries) = std::env::var("PEDIABLOG_CLIENT_MAX_RETRIES") {
            if let Ok(retries) = retries.parse::<u32>() {
                self.client.max_retries = retries;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "PEDIABLOG_SERVER_HOST",
    "PEDIABLOG_SERVER_PORT",
    "PEDIABLOG_SERVER_CORS_ORIGIN",
    "PEDIABLOG_DATABASE_DRIVER",
    "PEDIABLOG_DATABASE_URL",
    "PEDIABLOG_CACHE_TTL_SECONDS",
    "PEDIABLOG_AUTH_SESSION_DAYS",
    "PEDIABLOG_CLIENT_API_BASE_URL",
    "PEDIABLOG_CLIENT_MAX_RETRIES",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}
