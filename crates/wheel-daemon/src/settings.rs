//! Daemon Configuration
//!
//! Settings come from an optional TOML file, then `WHEEL__`-prefixed
//! environment variables (`WHEEL__SERIAL__DEVICE=/dev/ttyACM0`).

use anyhow::{Context, Result};
use button_actions::ButtonAction;
use elm_session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "wheel-daemon.toml";

/// Serial device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`
    pub device: String,
    /// Line speed of the adapter
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 38400,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top level daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Adapter connection
    pub serial: SerialConfig,

    /// Seconds between session health checks
    pub watchdog_interval_secs: u64,

    /// Protocol session settings
    pub session: SessionConfig,

    /// Program and arguments to spawn for each action
    pub actions: HashMap<ButtonAction, Vec<String>>,

    /// Log output
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            watchdog_interval_secs: 30,
            session: SessionConfig::default(),
            actions: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from `path` (may be missing) layered under the environment
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("WHEEL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("invalid daemon configuration")
    }

    /// Health check period, at least one second
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs.max(1))
    }
}
