//! Monitor configuration.
//!
//! One [`MonitorConfig`] is built at startup (defaults, then environment,
//! then command-line overrides) and handed to each component at
//! construction. Nothing reads global settings after that.
//!
//! ## Environment
//!
//! | variable | field | default |
//! |---|---|---|
//! | `KVLENS_REDIS_URL` | `store.url` | `redis://127.0.0.1:6379/0` |
//! | `KVLENS_CONNECT_TIMEOUT_MS` | `store.connect_timeout_ms` | `2000` |
//! | `KVLENS_IO_TIMEOUT_MS` | `store.io_timeout_ms` | `5000` |
//! | `KVLENS_COLLECTION_INTERVAL` | `collection_interval_secs` | `60` |
//! | `KVLENS_RETENTION_DAYS` | `retention_days` | `7` |
//! | `KVLENS_HISTORY_PATH` | `history_path` | unset (in-memory) |

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default port of a Redis-compatible store.
pub const DEFAULT_STORE_PORT: u16 = 6379;

/// Longest accepted retention window, in days.
pub const MAX_RETENTION_DAYS: u64 = 36_500;

/// Errors raised while building a configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid store url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: String, value: String },
}

/// Connection settings for the monitored store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `redis://[[user]:password@]host[:port][/db]`
    pub url: String,
    pub connect_timeout_ms: u64,
    /// Read/write timeout for a single command or pipeline.
    pub io_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            connect_timeout_ms: 2_000,
            io_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Parses `url` into its parts.
    pub fn address(&self) -> Result<StoreAddress, ConfigError> {
        StoreAddress::parse(&self.url)
    }
}

/// Top-level configuration passed to the monitor and the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub store: StoreConfig,
    /// Seconds between two collections in repeat mode.
    pub collection_interval_secs: u64,
    /// Records older than this many days are pruned.
    pub retention_days: u64,
    /// SQLite file for the metrics history; in-memory when unset.
    pub history_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            collection_interval_secs: 60,
            retention_days: 7,
            history_path: None,
        }
    }
}

impl MonitorConfig {
    /// Defaults overlaid with `KVLENS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("KVLENS_REDIS_URL") {
            config.store.url = url;
        }
        if let Some(ms) = parse_var(&lookup, "KVLENS_CONNECT_TIMEOUT_MS")? {
            config.store.connect_timeout_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "KVLENS_IO_TIMEOUT_MS")? {
            config.store.io_timeout_ms = ms;
        }
        if let Some(secs) = parse_var(&lookup, "KVLENS_COLLECTION_INTERVAL")? {
            config.collection_interval_secs = secs;
        }
        if let Some(days) = parse_var(&lookup, "KVLENS_RETENTION_DAYS")? {
            config.retention_days = days;
        }
        if let Some(path) = lookup("KVLENS_HISTORY_PATH").filter(|p| !p.is_empty()) {
            config.history_path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the values that would otherwise fail much later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.address()?;
        if self.collection_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "collection_interval_secs".to_string(),
                value: "0".to_string(),
            });
        }
        self.retention()?;
        Ok(())
    }

    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_secs)
    }

    /// Retention window; fails above [`MAX_RETENTION_DAYS`].
    pub fn retention(&self) -> Result<chrono::Duration, ConfigError> {
        Some(self.retention_days)
            .filter(|days| *days <= MAX_RETENTION_DAYS)
            .and_then(|days| i64::try_from(days).ok())
            .and_then(chrono::Duration::try_days)
            .ok_or_else(|| ConfigError::InvalidValue {
                name: "retention_days".to_string(),
                value: self.retention_days.to_string(),
            })
    }
}

fn parse_var<F>(lookup: &F, name: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}

/// Parsed store URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAddress {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: u32,
}

impl StoreAddress {
    /// Parses `redis://[[user]:password@]host[:port][/db]`.
    ///
    /// ```
    /// use kvlens::config::StoreAddress;
    ///
    /// let addr = StoreAddress::parse("redis://:secret@cache.local:6380/2").unwrap();
    /// assert_eq!(addr.host, "cache.local");
    /// assert_eq!(addr.port, 6380);
    /// assert_eq!(addr.password.as_deref(), Some("secret"));
    /// assert_eq!(addr.db, 2);
    /// ```
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let rest = url
            .strip_prefix("redis://")
            .ok_or_else(|| invalid("scheme must be redis://"))?;

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (rest, ""),
        };

        let (credentials, host_port) = match authority.rsplit_once('@') {
            Some((credentials, host_port)) => (Some(credentials), host_port),
            None => (None, authority),
        };

        let (username, password) = match credentials {
            Some(credentials) => match credentials.split_once(':') {
                Some((user, pass)) => (
                    Some(user.to_string()).filter(|u| !u.is_empty()),
                    Some(pass.to_string()),
                ),
                None => (None, Some(credentials.to_string())),
            },
            None => (None, None),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>().map_err(|_| invalid("port is not a number"))?,
            ),
            None => (host_port, DEFAULT_STORE_PORT),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let db = if path.is_empty() {
            0
        } else {
            path.parse::<u32>()
                .map_err(|_| invalid("database must be a number"))?
        };

        Ok(Self {
            host: host.to_string(),
            port,
            username,
            password,
            db,
        })
    }

    /// `host:port` for the TCP connect.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
