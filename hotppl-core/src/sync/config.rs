//! Sync client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::SyncError;
use super::reconnect::ReconnectPolicy;
use crate::endpoint::{derive_server_url, normalize_server_url, EndpointError};

/// Settings for one [`SyncClient`](super::SyncClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Explicit server URL (e.g. "ws://localhost:8765"); wins over the
    /// derived endpoint
    pub server_url: Option<String>,
    /// Hostname the host was loaded from
    pub hostname: String,
    /// Whether the host was loaded over a secure transport
    pub secure: bool,
    pub port: u16,
    /// Host used when `hostname` is not local
    pub production_host: String,
    pub reconnect_base_ms: u64,
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            hostname: "localhost".to_string(),
            secure: false,
            port: 8765,
            production_host: "api.hotppl.io".to_string(),
            reconnect_base_ms: 1000,
            max_reconnect_attempts: 10,
            heartbeat_interval_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl SyncConfig {
    /// Config pointing straight at `server_url`, everything else default.
    pub fn for_url(server_url: impl Into<String>) -> Self {
        Self {
            server_url: Some(server_url.into()),
            ..Self::default()
        }
    }

    /// Resolves the WebSocket URL to connect to.
    pub fn ws_url(&self) -> Result<String, EndpointError> {
        match self.server_url.as_deref() {
            Some(url) => normalize_server_url(url),
            None => {
                if self.production_host.trim().is_empty() {
                    return Err(EndpointError::EmptyHost);
                }
                Ok(derive_server_url(
                    self.secure,
                    &self.hostname,
                    &self.production_host,
                    self.port,
                ))
            }
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Checks that every interval is usable.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.reconnect_base_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "reconnect_base_ms must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        self.ws_url()?;
        Ok(())
    }
}
