//! Relay configuration
//!
//! Loaded from `signalhub.toml`. Every key is optional; a missing
//! section falls back to its defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Config file name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "signalhub.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub hub: HubConfig,
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket listen address
    pub listen: SocketAddr,
    /// Only path on which upgrades are accepted
    pub ws_path: String,
    /// Raw length-prefixed TCP listener, disabled when absent
    pub tcp_listen: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ws_path: "/ws".to_string(),
            tcp_listen: None,
        }
    }
}

/// Hub and per-connection limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Outbound queue bound per peer; a full mailbox gets its peer evicted
    pub mailbox_capacity: usize,
    /// Bound of the hub's event queue
    pub event_buffer: usize,
    /// Largest inbound frame accepted, in bytes
    pub max_frame_size: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            event_buffer: 1024,
            max_frame_size: 1024 * 1024,
        }
    }
}

impl Config {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load an explicit file, or the default location if it exists, or defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.server.ws_path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "ws_path must start with '/': {}",
                self.server.ws_path
            )));
        }
        if self.hub.mailbox_capacity == 0 {
            return Err(Error::InvalidConfig("mailbox_capacity must be > 0".into()));
        }
        if self.hub.event_buffer == 0 {
            return Err(Error::InvalidConfig("event_buffer must be > 0".into()));
        }
        if self.hub.max_frame_size == 0 {
            return Err(Error::InvalidConfig("max_frame_size must be > 0".into()));
        }
        Ok(())
    }
}

/// Default config file location for this platform
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "signalhub").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
