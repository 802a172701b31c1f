// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Daemon settings file handling.
//!
//! Hardware wiring, timing, and file locations live in a TOML file.
//! Default path: `/etc/pfcd/pfcd.toml`. The fan threshold table itself is a
//! separate plain-text file, see [`crate::thresholds`].

use crate::bus;
use crate::error::{Error, Result};
use crate::gpio;
use crate::sensor;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default settings file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pfcd/pfcd.toml";

/// Default threshold table location.
pub const DEFAULT_THRESHOLDS_PATH: &str = "/etc/pfcd/fan.cnf";

/// Default seconds between temperature polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default longest pulse, in milliseconds, still read as a reboot request.
pub const DEFAULT_PULSE_THRESHOLD_MS: u64 = 30;

/// Default number of consecutive sensor failures the fan loop tolerates.
pub const DEFAULT_MAX_SENSOR_FAILURES: u32 = 3;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Fan loop settings.
    #[serde(default)]
    pub fan: FanConfig,

    /// Power button settings.
    #[serde(default)]
    pub power: PowerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanConfig {
    /// Path of the `temperature=fanspeed` table.
    #[serde(default = "default_thresholds_path")]
    pub thresholds_path: PathBuf,

    /// Millidegree temperature file.
    #[serde(default = "default_sensor_path")]
    pub sensor_path: PathBuf,

    /// Seconds between temperature polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// I2C bus number. Picked from the board revision when absent.
    #[serde(default)]
    pub i2c_bus: Option<u8>,

    /// 7-bit address of the fan controller.
    #[serde(default = "default_address")]
    pub address: u16,

    /// Consecutive failed temperature reads before the fan loop gives up.
    #[serde(default = "default_max_sensor_failures")]
    pub max_sensor_failures: u32,

    /// Speeds to run through at startup before monitoring begins.
    #[serde(default)]
    pub self_test: Vec<SelfTestStep>,
}

impl FanConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            thresholds_path: default_thresholds_path(),
            sensor_path: default_sensor_path(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            i2c_bus: None,
            address: bus::DEFAULT_ADDRESS,
            max_sensor_failures: DEFAULT_MAX_SENSOR_FAILURES,
            self_test: Vec::new(),
        }
    }
}

/// One step of the startup fan test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfTestStep {
    /// Fan duty 0-100
    pub speed: u8,
    /// How long to hold it, in milliseconds
    pub hold_ms: u64,
}

impl SelfTestStep {
    pub fn is_valid(&self) -> bool {
        self.speed <= bus::MAX_SPEED
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerConfig {
    /// BCM number of the button signal line.
    #[serde(default = "default_gpio_pin")]
    pub gpio_pin: u8,

    /// Pulses up to this long mean reboot; longer ones mean poweroff.
    #[serde(default = "default_pulse_threshold")]
    pub pulse_threshold_ms: u64,

    /// Optional interrupt debounce period. Without it, contact bounce while
    /// the button is held shows up as an early falling edge and a long press
    /// is read as a short one (reboot). A few milliseconds, well under
    /// `pulse_threshold_ms`, is enough for most boards.
    #[serde(default)]
    pub debounce_ms: Option<u64>,

    /// Log power actions instead of running them.
    #[serde(default)]
    pub dry_run: bool,
}

impl PowerConfig {
    pub fn pulse_threshold(&self) -> Duration {
        Duration::from_millis(self.pulse_threshold_ms)
    }

    pub fn debounce(&self) -> Option<Duration> {
        self.debounce_ms.map(Duration::from_millis)
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            gpio_pin: gpio::DEFAULT_BUTTON_PIN,
            pulse_threshold_ms: DEFAULT_PULSE_THRESHOLD_MS,
            debounce_ms: None,
            dry_run: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load config from a TOML file, or return the default if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        Err(e) => return Err(e.into()),
    };

    let mut config: Config = toml::from_str(&contents).map_err(|e| Error::Settings {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    config.fan.self_test.retain(|step| {
        let valid = step.is_valid();
        if !valid {
            log::warn!("Ignoring self-test step with speed {} % (must be 0-100)", step.speed);
        }
        valid
    });

    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Resolve the config file path from CLI arg or default.
pub fn resolve_config_path(cli_path: Option<&str>) -> PathBuf {
    cli_path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_thresholds_path() -> PathBuf {
    PathBuf::from(DEFAULT_THRESHOLDS_PATH)
}

fn default_sensor_path() -> PathBuf {
    PathBuf::from(sensor::DEFAULT_SENSOR_PATH)
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_address() -> u16 {
    bus::DEFAULT_ADDRESS
}

fn default_max_sensor_failures() -> u32 {
    DEFAULT_MAX_SENSOR_FAILURES
}

fn default_gpio_pin() -> u8 {
    gpio::DEFAULT_BUTTON_PIN
}

fn default_pulse_threshold() -> u64 {
    DEFAULT_PULSE_THRESHOLD_MS
}
