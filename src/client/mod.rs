//! Store Client Module
//!
//! [`StoreClient`] is the only way the rest of the crate talks to the store.
//! It holds no open socket: every logical operation calls
//! [`StoreClient::connect`], uses the returned [`Connection`] and drops it.
//!
//! ## Failure Classification
//!
//! ```text
//! connect()
//!    │
//!    ├── TCP refused / DNS / timeout ──┐
//!    ├── AUTH rejected ────────────────┼──> MonitorError::Unreachable
//!    ├── SELECT / PING failed ─────────┘
//!    │
//!    ▼
//! Connection::exec / pipeline
//!    │
//!    └── any failure ──────────────────────> MonitorError::Internal
//! ```

pub mod connection;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::{Connection, ConnectionError};

use crate::config::{ConfigError, StoreAddress, StoreConfig};
use crate::error::{MonitorError, Result};
use tracing::warn;

/// Fault-surfacing handle to the monitored store.
#[derive(Debug, Clone)]
pub struct StoreClient {
    config: StoreConfig,
    address: StoreAddress,
}

impl StoreClient {
    /// Validates the store URL. No connection is attempted.
    pub fn new(config: StoreConfig) -> std::result::Result<Self, ConfigError> {
        let address = config.address()?;
        Ok(Self { config, address })
    }

    /// Opens a connection, failing with `Unreachable` when the store does not
    /// answer the handshake.
    pub async fn connect(&self) -> Result<Connection> {
        Connection::open(&self.address, &self.config)
            .await
            .map_err(|e| {
                warn!(peer = %self.address.socket_addr(), error = %e, "Store unreachable");
                MonitorError::Unreachable(e.to_string())
            })
    }

    /// True when a connection can be opened right now.
    pub async fn is_reachable(&self) -> bool {
        self.connect().await.is_ok()
    }

    pub fn address(&self) -> &StoreAddress {
        &self.address
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}
