// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Configuration file handling.
//!
//! Declares which sensors and fans are controlled and how the daemon paces
//! its tasks. Default path: `/etc/fangov/config.toml`

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fangov/config.toml";

/// Default sample store location.
pub const DEFAULT_DB_PATH: &str = "/var/lib/fangov/samples.json";

pub const DEFAULT_TEMP_POLLING_RATE_MS: u64 = 200;
pub const DEFAULT_RPM_POLLING_RATE_MS: u64 = 1000;
pub const DEFAULT_ADJUSTMENT_TICK_RATE_MS: u64 = 200;
pub const DEFAULT_TEMP_WINDOW_SIZE: usize = 100;
pub const DEFAULT_RPM_WINDOW_SIZE: usize = 10;
pub const DEFAULT_MONITOR_WARMUP_MS: u64 = 2000;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Daemon settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Temperature sensors used for control.
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,

    /// Fans driven by a control loop.
    #[serde(default)]
    pub fans: Vec<FanConfig>,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Path of the sample store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// How often temperature sensors are sampled, in milliseconds.
    #[serde(default = "default_temp_polling_rate")]
    pub temp_sensor_polling_rate_ms: u64,

    /// How often fan RPM is sampled, in milliseconds.
    #[serde(default = "default_rpm_polling_rate")]
    pub rpm_polling_rate_ms: u64,

    /// How often each fan loop recomputes its PWM, in milliseconds.
    #[serde(default = "default_adjustment_tick_rate")]
    pub controller_adjustment_tick_rate_ms: u64,

    /// Samples held by each temperature window.
    #[serde(default = "default_temp_window_size")]
    pub temp_rolling_window_size: usize,

    /// Samples held by each per-duty RPM window.
    #[serde(default = "default_rpm_window_size")]
    pub rpm_rolling_window_size: usize,

    /// Delay between starting telemetry and starting the fan loops.
    #[serde(default = "default_monitor_warmup")]
    pub monitor_warmup_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            temp_sensor_polling_rate_ms: DEFAULT_TEMP_POLLING_RATE_MS,
            rpm_polling_rate_ms: DEFAULT_RPM_POLLING_RATE_MS,
            controller_adjustment_tick_rate_ms: DEFAULT_ADJUSTMENT_TICK_RATE_MS,
            temp_rolling_window_size: DEFAULT_TEMP_WINDOW_SIZE,
            rpm_rolling_window_size: DEFAULT_RPM_WINDOW_SIZE,
            monitor_warmup_ms: DEFAULT_MONITOR_WARMUP_MS,
        }
    }
}

impl DaemonConfig {
    pub fn temp_polling_rate(&self) -> Duration {
        Duration::from_millis(self.temp_sensor_polling_rate_ms)
    }

    pub fn rpm_polling_rate(&self) -> Duration {
        Duration::from_millis(self.rpm_polling_rate_ms)
    }

    pub fn adjustment_tick_rate(&self) -> Duration {
        Duration::from_millis(self.controller_adjustment_tick_rate_ms)
    }

    pub fn monitor_warmup(&self) -> Duration {
        Duration::from_millis(self.monitor_warmup_ms)
    }
}

/// A temperature sensor matched by `(platform, index)`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SensorConfig {
    /// Identifier fans refer to.
    pub id: String,
    /// Platform of the owning hwmon device (its `name`).
    pub platform: String,
    /// N in `tempN_input`.
    pub index: u32,
    /// Temperature (°C) at or below which fans may stop.
    pub min: i64,
    /// Temperature (°C) at or above which fans run at full speed.
    pub max: i64,
}

impl SensorConfig {
    pub fn min_millidegrees(&self) -> i64 {
        self.min * 1000
    }

    pub fn max_millidegrees(&self) -> i64 {
        self.max * 1000
    }
}

/// A controlled fan.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FanConfig {
    pub id: String,
    /// Id of the [`SensorConfig`] this fan follows.
    pub sensor: String,
    /// Optional curve association, reported but not interpreted.
    #[serde(default)]
    pub curve: Option<String>,
    /// Never command a duty below the learned start PWM.
    #[serde(default)]
    pub never_stop: bool,
    /// Where the fan lives.
    pub source: FanSource,
}

/// Backend of a configured fan.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum FanSource {
    /// A `pwmN` output of an hwmon device.
    #[serde(rename = "hwmon")]
    Hwmon {
        /// Platform of the owning hwmon device (its `name`).
        platform: String,
        /// N in `pwmN`.
        index: u32,
    },

    /// A plain file receiving the duty value; no RPM feedback.
    #[serde(rename = "file")]
    File { path: PathBuf },
}

impl Config {
    /// Look up a sensor config by the hardware coordinates of a sensor.
    pub fn find_sensor(&self, platform: &str, index: u32) -> Option<&SensorConfig> {
        self.sensors
            .iter()
            .find(|s| s.platform == platform && s.index == index)
    }

    /// Look up an hwmon fan config by the hardware coordinates of a fan.
    pub fn find_hwmon_fan(&self, platform: &str, index: u32) -> Option<&FanConfig> {
        self.fans.iter().find(|f| match &f.source {
            FanSource::Hwmon {
                platform: p,
                index: i,
            } => p == platform && *i == index,
            FanSource::File { .. } => false,
        })
    }

    /// Fans backed by plain files.
    pub fn file_fans(&self) -> impl Iterator<Item = (&FanConfig, &Path)> {
        self.fans.iter().filter_map(|f| match &f.source {
            FanSource::File { path } => Some((f, path.as_path())),
            FanSource::Hwmon { .. } => None,
        })
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        let d = &self.daemon;
        if d.temp_rolling_window_size == 0 || d.rpm_rolling_window_size == 0 {
            return Err(Error::Config("Rolling window sizes must be > 0".to_string()));
        }
        if d.temp_sensor_polling_rate_ms == 0
            || d.rpm_polling_rate_ms == 0
            || d.controller_adjustment_tick_rate_ms == 0
        {
            return Err(Error::Config("Polling and tick rates must be > 0".to_string()));
        }

        let mut sensor_ids = HashSet::new();
        for s in &self.sensors {
            if !sensor_ids.insert(s.id.as_str()) {
                return Err(Error::Config(format!("Duplicate sensor id '{}'", s.id)));
            }
            if s.min > s.max {
                return Err(Error::Config(format!(
                    "Sensor '{}': min ({}) is above max ({})",
                    s.id, s.min, s.max
                )));
            }
        }

        let mut fan_ids = HashSet::new();
        for f in &self.fans {
            if !fan_ids.insert(f.id.as_str()) {
                return Err(Error::Config(format!("Duplicate fan id '{}'", f.id)));
            }
            if !sensor_ids.contains(f.sensor.as_str()) {
                return Err(Error::UnknownSensor {
                    fan: f.id.clone(),
                    sensor: f.sensor.clone(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load config from a TOML file, or return the default if the file doesn't exist.
pub fn load_config(path: &Path) -> io::Result<Config> {
    if !path.exists() {
        log::info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)?;
    let config = parse_config(&contents)?;

    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Parse config from TOML text.
pub fn parse_config(contents: &str) -> io::Result<Config> {
    toml::from_str(contents).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to parse config: {e}"),
        )
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

fn default_temp_polling_rate() -> u64 {
    DEFAULT_TEMP_POLLING_RATE_MS
}

fn default_rpm_polling_rate() -> u64 {
    DEFAULT_RPM_POLLING_RATE_MS
}

fn default_adjustment_tick_rate() -> u64 {
    DEFAULT_ADJUSTMENT_TICK_RATE_MS
}

fn default_temp_window_size() -> usize {
    DEFAULT_TEMP_WINDOW_SIZE
}

fn default_rpm_window_size() -> usize {
    DEFAULT_RPM_WINDOW_SIZE
}

fn default_monitor_warmup() -> u64 {
    DEFAULT_MONITOR_WARMUP_MS
}
