//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use gnubby_core::DEFAULT_TIMEOUT_SECS;

use crate::error::DaemonError;

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Unix socket path pages (via the browser shim) connect to
    pub ipc_socket_path: PathBuf,

    /// Unix socket path of the device helper
    pub helper_socket_path: PathBuf,

    /// Ceremony timeout when the page gives none (seconds)
    pub default_timeout_secs: u64,

    /// Extra time the sign watchdog waits past the ceremony timeout (milliseconds)
    pub watchdog_grace_ms: u64,

    /// App id -> additional origins it authorizes
    pub trusted_facets: HashMap<String, Vec<String>>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            ipc_socket_path: Self::runtime_path("gnubbyd.sock"),
            helper_socket_path: Self::runtime_path("gnubby-helper.sock"),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            watchdog_grace_ms: 1000,
            trusted_facets: HashMap::new(),
        }
    }
}

impl DaemonConfig {
    fn runtime_path(name: &str) -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, fallback to /tmp
        std::env::var_os("XDG_RUNTIME_DIR")
            .map(|dir| PathBuf::from(dir).join(name))
            .unwrap_or_else(|| PathBuf::from("/tmp").join(name))
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn watchdog_grace(&self) -> Duration {
        Duration::from_millis(self.watchdog_grace_ms)
    }

    /// Reject settings no ceremony could run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.default_timeout_secs == 0 {
            return Err(DaemonError::Config(
                "default_timeout_secs must be positive".to_string(),
            ));
        }
        if self.watchdog_grace_ms == 0 {
            return Err(DaemonError::Config(
                "watchdog_grace_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create socket directories if they don't exist
    pub fn ensure_directories(&self) -> crate::Result<()> {
        if let Some(parent) = self.ipc_socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
