//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::geo::Coordinate;
use crate::location::SampleOptions;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Position tracker configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    /// Minimum movement before a continuous sample is broadcast
    #[serde(default = "default_min_distance_to_send_m")]
    pub min_distance_to_send_m: f64,

    /// Window during which repeated identical-kind sampling failures
    /// are reported only once
    #[serde(default = "default_error_report_window_ms")]
    pub error_report_window_ms: u64,

    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,

    #[serde(default = "default_maximum_age_ms")]
    pub maximum_age_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_one_shot_maximum_age_ms")]
    pub one_shot_maximum_age_ms: u64,

    #[serde(default = "default_one_shot_timeout_ms")]
    pub one_shot_timeout_ms: u64,

    /// Delay between a channel (re)connect and the resync send
    #[serde(default = "default_resync_delay_ms")]
    pub resync_delay_ms: u64,
}

/// Delivery channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    #[serde(default = "default_server_addr")]
    pub server_addr: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_reconnect_delay_max_ms")]
    pub reconnect_delay_max_ms: u64,
}

/// Key-value store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

/// Replay location source configuration (demo binary)
#[derive(Debug, Deserialize, Clone)]
pub struct ReplayConfig {
    #[serde(default = "default_replay_interval_ms")]
    pub interval_ms: u64,

    /// Route points as `[lat, lng]` pairs, walked in a loop
    #[serde(default = "default_replay_route")]
    pub route: Vec<[f64; 2]>,
}

// Default value functions
fn default_min_distance_to_send_m() -> f64 { 5.0 }
fn default_error_report_window_ms() -> u64 { 30_000 }
fn default_high_accuracy() -> bool { true }
fn default_maximum_age_ms() -> u64 { 500 }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_one_shot_maximum_age_ms() -> u64 { 5_000 }
fn default_one_shot_timeout_ms() -> u64 { 10_000 }
fn default_resync_delay_ms() -> u64 { 500 }

fn default_server_addr() -> String { "127.0.0.1:4000".to_string() }
fn default_connect_timeout_ms() -> u64 { 20_000 }
fn default_reconnect_delay_ms() -> u64 { 1_000 }
fn default_reconnect_delay_max_ms() -> u64 { 5_000 }

fn default_store_path() -> String { "./geotrack-store.json".to_string() }

fn default_replay_interval_ms() -> u64 { 1_000 }
fn default_replay_route() -> Vec<[f64; 2]> {
    // A short walk around a block in Bogota
    vec![
        [4.6534, -74.0837],
        [4.6536, -74.0834],
        [4.6539, -74.0836],
        [4.6537, -74.0839],
    ]
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_distance_to_send_m: default_min_distance_to_send_m(),
            error_report_window_ms: default_error_report_window_ms(),
            high_accuracy: default_high_accuracy(),
            maximum_age_ms: default_maximum_age_ms(),
            timeout_ms: default_timeout_ms(),
            one_shot_maximum_age_ms: default_one_shot_maximum_age_ms(),
            one_shot_timeout_ms: default_one_shot_timeout_ms(),
            resync_delay_ms: default_resync_delay_ms(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_delay_max_ms: default_reconnect_delay_max_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_replay_interval_ms(),
            route: default_replay_route(),
        }
    }
}

impl TrackingConfig {
    /// Sampling options for the continuous watch.
    pub fn watch_options(&self) -> SampleOptions {
        SampleOptions {
            high_accuracy: self.high_accuracy,
            maximum_age: Duration::from_millis(self.maximum_age_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// Sampling options for one-shot requests, which accept an older
    /// cached fix than the continuous watch does.
    pub fn one_shot_options(&self) -> SampleOptions {
        SampleOptions {
            high_accuracy: self.high_accuracy,
            maximum_age: Duration::from_millis(self.one_shot_maximum_age_ms),
            timeout: Duration::from_millis(self.one_shot_timeout_ms),
        }
    }

    pub fn error_report_window(&self) -> Duration {
        Duration::from_millis(self.error_report_window_ms)
    }

    pub fn resync_delay(&self) -> Duration {
        Duration::from_millis(self.resync_delay_ms)
    }
}

impl ChannelConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn reconnect_delay_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_max_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use geotrack::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults
    /// when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!("no configuration at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if !self.tracking.min_distance_to_send_m.is_finite()
            || self.tracking.min_distance_to_send_m < 0.0
            || self.tracking.min_distance_to_send_m > 100_000.0
        {
            return Err(crate::error::GeotrackError::Config(
                toml::de::Error::custom("min_distance_to_send_m must be between 0 and 100000"),
            ));
        }

        if self.tracking.error_report_window_ms == 0
            || self.tracking.error_report_window_ms > 600_000
        {
            return Err(crate::error::GeotrackError::Config(
                toml::de::Error::custom("error_report_window_ms must be between 1 and 600000"),
            ));
        }

        for (name, value) in [
            ("timeout_ms", self.tracking.timeout_ms),
            ("one_shot_timeout_ms", self.tracking.one_shot_timeout_ms),
        ] {
            if value == 0 || value > 60_000 {
                return Err(crate::error::GeotrackError::Config(toml::de::Error::custom(
                    format!("{} must be between 1 and 60000", name),
                )));
            }
        }

        if self.tracking.maximum_age_ms > 60_000 || self.tracking.one_shot_maximum_age_ms > 60_000 {
            return Err(crate::error::GeotrackError::Config(
                toml::de::Error::custom("maximum sample ages must not exceed 60000 ms"),
            ));
        }

        if self.tracking.resync_delay_ms > 10_000 {
            return Err(crate::error::GeotrackError::Config(
                toml::de::Error::custom("resync_delay_ms must not exceed 10000"),
            ));
        }

        if self.channel.server_addr.is_empty() {
            return Err(crate::error::GeotrackError::Config(
                toml::de::Error::custom("channel server_addr cannot be empty"),
            ));
        }

        if self.channel.connect_timeout_ms == 0 || self.channel.connect_timeout_ms > 60_000 {
            return Err(crate::error::GeotrackError::Config(
                toml::de::Error::custom("connect_timeout_ms must be between 1 and 60000"),
            ));
        }

        if self.channel.reconnect_delay_ms == 0 || self.channel.reconnect_delay_ms > 60_000 {
            return Err(crate::error::GeotrackError::Config(
                toml::de::Error::custom("reconnect_delay_ms must be between 1 and 60000"),
            ));
        }

        if self.channel.reconnect_delay_max_ms < self.channel.reconnect_delay_ms
            || self.channel.reconnect_delay_max_ms > 300_000
        {
            return Err(crate::error::GeotrackError::Config(toml::de::Error::custom(
                "reconnect_delay_max_ms must be between reconnect_delay_ms and 300000",
            )));
        }

        if self.storage.path.is_empty() {
            return Err(crate::error::GeotrackError::Config(
                toml::de::Error::custom("storage path cannot be empty"),
            ));
        }

        if self.replay.interval_ms == 0 || self.replay.interval_ms > 60_000 {
            return Err(crate::error::GeotrackError::Config(
                toml::de::Error::custom("replay interval_ms must be between 1 and 60000"),
            ));
        }

        if self.replay.route.is_empty() {
            return Err(crate::error::GeotrackError::Config(
                toml::de::Error::custom("replay route must contain at least one point"),
            ));
        }

        for &[lat, lng] in &self.replay.route {
            if !Coordinate::new(lat, lng).is_valid() {
                return Err(crate::error::GeotrackError::Config(toml::de::Error::custom(
                    format!("replay route point ({}, {}) is out of range", lat, lng),
                )));
            }
        }

        Ok(())
    }
}
