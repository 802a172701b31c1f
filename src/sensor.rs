// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! CPU temperature input.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default thermal zone exposed by the SoC.
pub const DEFAULT_SENSOR_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Something that yields a temperature in degrees Celsius.
pub trait TempSource {
    fn read_celsius(&mut self) -> Result<f64>;
}

/// Sysfs-style sensor file holding millidegrees Celsius.
#[derive(Debug, Clone)]
pub struct ThermalZone {
    path: PathBuf,
}

impl ThermalZone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for ThermalZone {
    fn default() -> Self {
        Self::new(DEFAULT_SENSOR_PATH)
    }
}

impl TempSource for ThermalZone {
    fn read_celsius(&mut self) -> Result<f64> {
        let raw = fs::read_to_string(&self.path).map_err(|e| Error::SensorRead {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        parse_millidegrees(&raw).ok_or_else(|| Error::SensorRead {
            path: self.path.clone(),
            reason: format!("unparsable value {:?}", raw.trim()),
        })
    }
}

/// Convert a millidegree reading such as `"48312\n"` to degrees.
pub fn parse_millidegrees(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let millic = match raw.parse::<i64>() {
        Ok(v) => v as f64,
        Err(_) => raw.parse::<f64>().ok().filter(|v| v.is_finite())?,
    };
    Some(millic / 1000.0)
}
