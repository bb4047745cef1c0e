//! Adapter configuration parameters
//!
//! Process-level settings: who the adapter is and where the control plane
//! lives. Loaded from an optional JSON file, then overridden by CLI flags
//! or environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Core adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    // --- Identity ---
    /// Name published in the Announcement
    pub name: String,

    // --- Control plane ---
    /// WebSocket URL of the control plane (`ws://` or `wss://`)
    pub url: String,
    /// Bearer token forwarded on the upgrade request
    pub token: String,

    // --- Reconnection ---
    /// Pause before each reconnect (milliseconds, 0 = immediate)
    pub reconnect_delay_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: "smartdoor".into(),
            url: "ws://localhost:8080/adapters".into(),
            token: String::new(),
            reconnect_delay_ms: 0,
        }
    }
}

impl AdapterConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Reject unusable values. Nothing is clamped or rewritten.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("name must not be empty"));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::ValidationFailed(
                "url must start with ws:// or wss://",
            ));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("token must not be empty"));
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
