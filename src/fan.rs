// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature-driven fan loop.
//!
//! Every poll the controller reads the CPU temperature, looks the target
//! speed up in its [`ThresholdMap`] and writes it to the board only when it
//! differs from the last speed applied. Speed changes are immediate steps.
//!
//! However the loop ends (stop request, sensor failure), [`FanController::run`]
//! writes speed 0 and releases the bus before returning.

use crate::bus::FanBus;
use crate::config::SelfTestStep;
use crate::error::Result;
use crate::sensor::TempSource;
use crate::stop::StopToken;
use crate::thresholds::ThresholdMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanState {
    /// Constructed, loop not started.
    Idle,
    /// Running the startup speed sequence.
    Testing,
    /// Steady state: poll, look up, write on change.
    Monitoring,
    /// Fan forced off and bus released.
    ShuttingDown,
}

pub struct FanController<B, S> {
    bus: B,
    sensor: S,
    thresholds: ThresholdMap,
    interval: Duration,
    self_test: Vec<SelfTestStep>,
    max_sensor_failures: u32,
    /// Last speed handed to the bus, `None` until the first write.
    applied: Option<u8>,
    state: FanState,
}

impl<B: FanBus, S: TempSource> FanController<B, S> {
    pub fn new(bus: B, sensor: S, thresholds: ThresholdMap) -> Self {
        Self {
            bus,
            sensor,
            thresholds,
            interval: Duration::from_secs(crate::config::DEFAULT_POLL_INTERVAL_SECS),
            self_test: Vec::new(),
            max_sensor_failures: crate::config::DEFAULT_MAX_SENSOR_FAILURES,
            applied: None,
            state: FanState::Idle,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_self_test(mut self, steps: Vec<SelfTestStep>) -> Self {
        self.self_test = steps;
        self
    }

    pub fn with_max_sensor_failures(mut self, limit: u32) -> Self {
        self.max_sensor_failures = limit.max(1);
        self
    }

    pub fn state(&self) -> FanState {
        self.state
    }

    pub fn applied_speed(&self) -> Option<u8> {
        self.applied
    }

    pub fn thresholds(&self) -> &ThresholdMap {
        &self.thresholds
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Speed the table asks for at `temp_c`.
    pub fn target_speed(&self, temp_c: f64) -> u8 {
        self.thresholds.speed_for(temp_c)
    }

    /// One monitoring step: read, look up, write if changed. Returns the
    /// target speed. Sensor errors are returned; bus errors are only logged.
    pub fn tick(&mut self) -> Result<u8> {
        let temp_c = self.sensor.read_celsius()?;
        log::debug!("Current CPU temp: {temp_c:.2} C");
        let target = self.target_speed(temp_c);
        self.apply(target);
        Ok(target)
    }

    /// Write `speed` unless it is already the applied speed.
    ///
    /// The speed counts as applied even if the write fails, so a failed
    /// write is only repeated once the target moves.
    fn apply(&mut self, speed: u8) {
        if self.applied == Some(speed) {
            return;
        }
        self.write(speed);
        self.applied = Some(speed);
    }

    fn write(&mut self, speed: u8) {
        match self.bus.write_speed(speed) {
            Ok(()) => log::info!("Set fan to {speed} %"),
            Err(e) => log::error!("Failed to set fan to {speed} %: {e}"),
        }
    }

    /// Run the self-test and then monitor until `stop` fires or the sensor
    /// keeps failing. Always ends with the fan at 0 and the bus released.
    pub fn run(&mut self, stop: &StopToken) -> Result<()> {
        let result = self.run_until_stopped(stop);
        self.shut_down();
        result
    }

    fn run_until_stopped(&mut self, stop: &StopToken) -> Result<()> {
        if !self.self_test.is_empty() {
            self.state = FanState::Testing;
            log::info!("Running fan self-test ({} step(s))", self.self_test.len());
            for step in self.self_test.clone() {
                self.write(step.speed);
                if let Some(reason) = stop.sleep(step.hold()) {
                    log::info!("Stop requested during self-test ({reason:?})");
                    return Ok(());
                }
            }
            // first reading after the test must reach the bus
            self.applied = None;
        }

        self.state = FanState::Monitoring;
        log::info!("Monitoring CPU temperature every {:?}, thresholds {}", self.interval, self.thresholds);

        let mut failures = 0;
        loop {
            if let Some(reason) = stop.reason() {
                log::info!("Stop requested ({reason:?})");
                return Ok(());
            }

            match self.tick() {
                Ok(_) => failures = 0,
                Err(e) => {
                    failures += 1;
                    log::error!("{e} ({failures}/{})", self.max_sensor_failures);
                    if failures >= self.max_sensor_failures {
                        log::error!("Giving up on temperature sensor");
                        return Err(e);
                    }
                }
            }

            if let Some(reason) = stop.sleep(self.interval) {
                log::info!("Stop requested while waiting ({reason:?})");
                return Ok(());
            }
        }
    }

    fn shut_down(&mut self) {
        self.state = FanState::ShuttingDown;
        log::debug!("Cleaning up fan control...");
        self.write(0);
        self.applied = Some(0);
        self.bus.release();
    }
}
