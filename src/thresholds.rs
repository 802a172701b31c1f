// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan threshold table and its text-file loader.
//!
//! A threshold map assigns a fan speed (0-100 %) to a temperature (0-100 C).
//! The applied speed is the one mapped to the highest threshold at or below
//! the current temperature. There is no interpolation between entries.
//!
//! File format, one pair per line:
//!
//! ```text
//! # temperature=fanspeed
//! 55=10
//! 60=55
//! 65=100
//! ```

use crate::error::Result;
use std::fs;
use std::io;
use std::path::Path;

/// Upper bound for both temperatures and speeds.
const MAX_VALUE: f64 = 100.0;

/// Ordered temperature-to-speed table, ascending by temperature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdMap {
    entries: Vec<(f64, u8)>,
}

impl ThresholdMap {
    /// Build a map from pairs. Out-of-range pairs are dropped; a repeated
    /// temperature keeps the last speed given for it.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (f64, u8)>) -> Self {
        let mut map = Self::default();
        for (temp_c, speed) in pairs {
            map.insert(temp_c, speed);
        }
        map
    }

    /// Insert a pair, replacing the speed of an existing equal temperature.
    /// Returns `false` (and leaves the map untouched) for values outside
    /// `[0, 100]`.
    pub fn insert(&mut self, temp_c: f64, speed: u8) -> bool {
        if !in_range(temp_c) || f64::from(speed) > MAX_VALUE {
            return false;
        }
        // -0.0 and 0.0 are the same threshold
        let temp_c = temp_c + 0.0;
        match self.entries.binary_search_by(|(t, _)| t.total_cmp(&temp_c)) {
            Ok(i) => self.entries[i].1 = speed,
            Err(i) => self.entries.insert(i, (temp_c, speed)),
        }
        true
    }

    /// Speed for a temperature: the entry with the highest threshold that
    /// `temp_c` reaches, or 0 when it is colder than every threshold.
    pub fn speed_for(&self, temp_c: f64) -> u8 {
        self.entries
            .iter()
            .rev()
            .find(|(threshold, _)| temp_c >= *threshold)
            .map_or(0, |&(_, speed)| speed)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in ascending temperature order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, u8)> + '_ {
        self.entries.iter().copied()
    }
}

impl std::fmt::Display for ThresholdMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (temp_c, speed)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{temp_c:.2}C->{speed}%")?;
        }
        write!(f, "}}")
    }
}

/// Table used when no threshold file is available.
pub fn default_thresholds() -> ThresholdMap {
    ThresholdMap::from_pairs([(55.0, 10), (60.0, 55), (65.0, 100)])
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a threshold file. A missing file yields an empty map; any other I/O
/// error is returned.
pub fn load(path: &Path) -> Result<ThresholdMap> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("No threshold file at {}", path.display());
            return Ok(ThresholdMap::default());
        }
        Err(e) => return Err(e.into()),
    };

    let map = parse(&contents);
    log::debug!("Loaded {} threshold(s) from {}", map.len(), path.display());
    Ok(map)
}

/// Load a threshold file, falling back to [`default_thresholds`] when the
/// file is missing, unreadable, or has no usable lines.
pub fn load_or_default(path: &Path) -> ThresholdMap {
    match load(path) {
        Ok(map) if !map.is_empty() => map,
        Ok(_) => {
            log::info!("Using default fan thresholds");
            default_thresholds()
        }
        Err(e) => {
            log::error!("Could not read {}: {e}, using default fan thresholds", path.display());
            default_thresholds()
        }
    }
}

/// Parse threshold file contents, skipping lines that don't hold a valid pair.
pub fn parse(contents: &str) -> ThresholdMap {
    let mut map = ThresholdMap::default();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some((temp_c, speed)) => {
                map.insert(temp_c, speed);
            }
            None => log::debug!("Skipping threshold line {}: {line:?}", lineno + 1),
        }
    }
    map
}

fn parse_line(line: &str) -> Option<(f64, u8)> {
    let mut fields = line.split('=');
    let (Some(temp), Some(speed), None) = (fields.next(), fields.next(), fields.next()) else {
        return None;
    };

    let temp_c: f64 = temp.trim().parse().ok()?;
    if !in_range(temp_c) {
        return None;
    }

    // Speeds may be written as decimals; the fractional part is dropped
    // before the range check.
    let speed: f64 = speed.trim().parse().ok()?;
    let speed = speed.trunc();
    if !in_range(speed) {
        return None;
    }

    Some((temp_c, speed as u8))
}

fn in_range(value: f64) -> bool {
    (0.0..=MAX_VALUE).contains(&value)
}
