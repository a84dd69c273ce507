// ============================
// meeting-relay-lib/src/config.rs
// ============================
//! Configuration management.
use crate::error::AppError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Prefix of environment overrides, e.g. `RELAY_BIND_ADDR`
pub const ENV_PREFIX: &str = "RELAY_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level, used when `RUST_LOG` is not set
    pub log_level: String,
    /// Path the signaling socket is served on
    pub websocket_path: String,
    /// Seconds between two liveness sweeps
    pub sweep_interval_secs: u64,
    /// Absolute lifetime of a meeting in seconds
    pub max_meeting_age_secs: u64,
    /// Outbound frames buffered per connection before new ones are dropped
    pub outbound_queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            log_level: "info".to_string(),
            websocket_path: "/websocket/meeting".to_string(),
            sweep_interval_secs: 20,
            max_meeting_age_secs: 30 * 60,
            outbound_queue_capacity: 64,
        }
    }
}

impl Settings {
    /// Load from a specific TOML file and the environment. A missing file is
    /// not an error; the defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let settings: Settings = Self::figment(path.as_ref()).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// The provider chain: defaults, then file, then environment
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }
        if !self.websocket_path.starts_with('/') {
            return Err(AppError::Config(format!(
                "websocket path '{}' must start with '/'",
                self.websocket_path
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(AppError::Config("sweep interval must be positive".to_string()));
        }
        if self.max_meeting_age_secs == 0 {
            return Err(AppError::Config("meeting lifetime must be positive".to_string()));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(AppError::Config(
                "outbound queue capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn max_meeting_age(&self) -> Duration {
        Duration::from_secs(self.max_meeting_age_secs)
    }
}
