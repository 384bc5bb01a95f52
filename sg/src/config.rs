//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::gather::GathererSettings;

/// Errors raised while validating configuration or building an endpoint
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Both a scatter channel and a recipient list are configured; choose one")]
    BothDistributionModes,

    #[error("Neither a scatter channel nor a recipient list is configured")]
    NoDistributionMode,

    #[error("An aggregator is required")]
    MissingAggregator,

    #[error("An input channel is required")]
    MissingInput,

    #[error("Invalid {name}: {value}ms (use -1 for no limit)")]
    InvalidTimeout { name: &'static str, value: i64 },

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Endpoint behaviour
    #[serde(rename = "scatter-gather")]
    pub scatter_gather: ScatterGatherConfig,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./scattergather.yml`, then the user config dir,
    /// then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from("scattergather.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("scattergather").join("scattergather.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.scatter_gather.validate()?;

        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }
}

/// Timing and behaviour of one scatter-gather endpoint
///
/// Timeouts are in milliseconds; `-1` means wait without limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterGatherConfig {
    /// Bound on delivering the aggregated result to a capacity-limited output
    #[serde(rename = "send-timeout-ms", default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Bound on waiting for the aggregated result
    #[serde(rename = "gather-timeout-ms", default = "default_gather_timeout_ms")]
    pub gather_timeout_ms: i64,

    /// A gather timeout is a failure rather than an empty result
    #[serde(rename = "requires-reply", default = "default_true")]
    pub requires_reply: bool,

    /// Stamp sequence size/number on scattered copies
    #[serde(rename = "apply-sequence", default = "default_true")]
    pub apply_sequence: bool,

    /// Startup/shutdown ordering among co-located endpoints
    #[serde(default)]
    pub phase: i32,

    /// Partial reply groups older than this are expired; -1 disables expiry
    #[serde(rename = "group-timeout-ms", default = "default_group_timeout_ms")]
    pub group_timeout_ms: i64,

    /// How often the expiry reaper runs
    #[serde(rename = "reaper-interval-ms", default = "default_reaper_interval_ms")]
    pub reaper_interval_ms: u64,

    /// How long released correlation keys are remembered
    #[serde(rename = "tombstone-ttl-ms", default = "default_tombstone_ttl_ms")]
    pub tombstone_ttl_ms: u64,

    /// Aggregate and deliver partial groups on expiry instead of discarding
    #[serde(rename = "send-partial-result-on-expiry", default)]
    pub send_partial_result_on_expiry: bool,

    /// Distribution mode: skip recipients whose send fails
    #[serde(rename = "ignore-send-failures", default)]
    pub ignore_send_failures: bool,
}

fn default_send_timeout_ms() -> u64 {
    1000
}

fn default_gather_timeout_ms() -> i64 {
    -1
}

fn default_true() -> bool {
    true
}

fn default_group_timeout_ms() -> i64 {
    60_000
}

fn default_reaper_interval_ms() -> u64 {
    1000
}

fn default_tombstone_ttl_ms() -> u64 {
    60_000
}

impl Default for ScatterGatherConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            gather_timeout_ms: default_gather_timeout_ms(),
            requires_reply: true,
            apply_sequence: true,
            phase: 0,
            group_timeout_ms: default_group_timeout_ms(),
            reaper_interval_ms: default_reaper_interval_ms(),
            tombstone_ttl_ms: default_tombstone_ttl_ms(),
            send_partial_result_on_expiry: false,
            ignore_send_failures: false,
        }
    }
}

impl ScatterGatherConfig {
    /// Reject negative timeouts other than -1
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gather_timeout_ms < -1 {
            return Err(ConfigError::InvalidTimeout {
                name: "gather-timeout-ms",
                value: self.gather_timeout_ms,
            });
        }
        if self.group_timeout_ms < -1 {
            return Err(ConfigError::InvalidTimeout {
                name: "group-timeout-ms",
                value: self.group_timeout_ms,
            });
        }
        Ok(())
    }

    /// Gather timeout, `None` for an unbounded wait
    pub fn gather_timeout(&self) -> Option<Duration> {
        debug!(gather_timeout_ms = self.gather_timeout_ms, "ScatterGatherConfig::gather_timeout: called");
        millis_or_unbounded(self.gather_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms.max(1))
    }

    /// Expiry settings handed to the gatherer
    pub fn gatherer_settings(&self) -> GathererSettings {
        GathererSettings {
            group_timeout: millis_or_unbounded(self.group_timeout_ms),
            tombstone_ttl: Duration::from_millis(self.tombstone_ttl_ms),
            send_partial_result_on_expiry: self.send_partial_result_on_expiry,
        }
    }
}

fn millis_or_unbounded(ms: i64) -> Option<Duration> {
    u64::try_from(ms).ok().map(Duration::from_millis)
}
