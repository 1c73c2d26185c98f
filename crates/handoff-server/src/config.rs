//! Server configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for the handoff server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Seconds of observer silence before an SSE heartbeat is sent.
    pub heartbeat_interval_secs: u64,
    /// Seconds allowed for graceful shutdown before tasks are abandoned.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_secs: 1,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file is missing or unreadable. Unknown keys are ignored; missing keys
    /// take their default values.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        let Ok(raw) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                Self::default()
            }
        }
    }
}
