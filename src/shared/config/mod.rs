//! Application configuration module
//!
//! Configuration is layered: built-in defaults, then an optional TOML file
//! (path in `DIAGRAMSYNC_CONFIG`), then environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `SERVER_PORT` | `3000` |
//! | `DATABASE_URL` | unset (in-memory store) |
//! | `JWT_SECRET` | development secret |
//! | `INSTANCE_ID` | random per process |
//! | `BUS` | `postgres` when a database is configured, else `none` |
//! | `STORE_TIMEOUT_MS` | `5000` |
//! | `STORE_RETRIES` | `2` |
//! | `SUBSCRIBER_BUFFER` | `64` |
//! | `HISTORY_ON_DELETE` | `retain` |

use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_JWT_SECRET: &str = "dev-jwt-secret-change-me";

/// Cross-instance message bus backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    None,
    Postgres,
}

impl FromStr for BusKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(BusKind::None),
            "postgres" | "pg" => Ok(BusKind::Postgres),
            _ => Err(ConfigError::InvalidValue {
                key: "BUS",
                value: s.to_string(),
            }),
        }
    }
}

/// What happens to history entries when their diagram is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRetention {
    #[default]
    Retain,
    Cascade,
}

impl FromStr for HistoryRetention {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(HistoryRetention::Retain),
            "cascade" => Ok(HistoryRetention::Cascade),
            _ => Err(ConfigError::InvalidValue {
                key: "HISTORY_ON_DELETE",
                value: s.to_string(),
            }),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub instance_id: Option<String>,
    /// `None` picks Postgres when a database is configured
    pub bus: Option<BusKind>,
    pub store_timeout_ms: u64,
    pub store_retries: u32,
    pub subscriber_buffer: usize,
    pub history_on_delete: HistoryRetention,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            instance_id: None,
            bus: None,
            store_timeout_ms: 5000,
            store_retries: 2,
            subscriber_buffer: 64,
            history_on_delete: HistoryRetention::Retain,
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Load defaults, the optional TOML file, then the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("DIAGRAMSYNC_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            Err(_) => Self::default(),
        };
        base.apply_env(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from a variable lookup
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("SERVER_PORT") {
            self.port = parse_value("SERVER_PORT", &port)?;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.jwt_secret = secret;
        }
        if let Some(instance_id) = lookup("INSTANCE_ID").filter(|id| !id.trim().is_empty()) {
            self.instance_id = Some(instance_id);
        }
        if let Some(bus) = lookup("BUS") {
            self.bus = Some(bus.parse()?);
        }
        if let Some(timeout) = lookup("STORE_TIMEOUT_MS") {
            self.store_timeout_ms = parse_value("STORE_TIMEOUT_MS", &timeout)?;
        }
        if let Some(retries) = lookup("STORE_RETRIES") {
            self.store_retries = parse_value("STORE_RETRIES", &retries)?;
        }
        if let Some(buffer) = lookup("SUBSCRIBER_BUFFER") {
            self.subscriber_buffer = parse_value("SUBSCRIBER_BUFFER", &buffer)?;
        }
        if let Some(retention) = lookup("HISTORY_ON_DELETE") {
            self.history_on_delete = retention.parse()?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::MissingValue("JWT_SECRET"));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "STORE_TIMEOUT_MS",
                value: "0".to_string(),
            });
        }
        if self.subscriber_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SUBSCRIBER_BUFFER",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Bus to start, after applying the database-dependent default
    pub fn effective_bus(&self) -> BusKind {
        match (self.bus, &self.database_url) {
            (Some(kind), _) => kind,
            (None, Some(_)) => BusKind::Postgres,
            (None, None) => BusKind::None,
        }
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = secret.into();
        self
    }

    pub fn instance_id(mut self, id: impl Into<String>) -> Self {
        self.config.instance_id = Some(id.into());
        self
    }

    pub fn bus(mut self, bus: BusKind) -> Self {
        self.config.bus = Some(bus);
        self
    }

    pub fn store_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.store_timeout_ms = timeout_ms;
        self
    }

    pub fn store_retries(mut self, retries: u32) -> Self {
        self.config.store_retries = retries;
        self
    }

    pub fn subscriber_buffer(mut self, capacity: usize) -> Self {
        self.config.subscriber_buffer = capacity;
        self
    }

    pub fn history_on_delete(mut self, retention: HistoryRetention) -> Self {
        self.config.history_on_delete = retention;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}
