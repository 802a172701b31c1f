// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan controller on the I2C bus.
//!
//! The case board's microcontroller listens on a fixed 7-bit address. A
//! single byte `0..=100` sets the fan duty in percent; writing `0xFF` to
//! register 0 asks the board to cut power once the host has halted.

use crate::error::{Error, Result};
use rppal::i2c::I2c;

/// Default board address.
pub const DEFAULT_ADDRESS: u16 = 0x1A;

/// Highest duty the board accepts.
pub const MAX_SPEED: u8 = 100;

/// Register/value pair that requests a hardware poweroff.
const POWEROFF_REGISTER: u8 = 0x00;
const POWEROFF_SENTINEL: u8 = 0xFF;

/// Write access to the fan controller.
pub trait FanBus {
    /// Set the fan duty in percent (0-100).
    fn write_speed(&mut self, speed: u8) -> Result<()>;

    /// Ask the board to cut power after the host halts.
    fn request_poweroff(&mut self) -> Result<()>;

    /// Close the bus handle. Writes after this fail.
    fn release(&mut self);
}

/// rppal-backed fan controller handle.
pub struct I2cFan {
    i2c: Option<I2c>,
    address: u16,
}

impl I2cFan {
    /// Open the bus and select the board. With `bus = None` rppal picks the
    /// bus wired to the header pins for this Pi revision.
    pub fn open(bus: Option<u8>, address: u16) -> Result<Self> {
        let mut i2c = match bus {
            Some(bus) => I2c::with_bus(bus)?,
            None => I2c::new()?,
        };
        i2c.set_slave_address(address)?;
        log::debug!("Opened I2C bus {} for device {address:#04x}", i2c.bus());
        Ok(Self {
            i2c: Some(i2c),
            address,
        })
    }

    fn handle(&self) -> Result<&I2c> {
        self.i2c
            .as_ref()
            .ok_or_else(|| Error::Bus(format!("bus for {:#04x} already released", self.address)))
    }
}

impl FanBus for I2cFan {
    fn write_speed(&mut self, speed: u8) -> Result<()> {
        let speed = check_speed(speed)?;
        self.handle()?.smbus_send_byte(speed)?;
        Ok(())
    }

    fn request_poweroff(&mut self) -> Result<()> {
        self.handle()?
            .smbus_write_byte(POWEROFF_REGISTER, POWEROFF_SENTINEL)?;
        Ok(())
    }

    fn release(&mut self) {
        if self.i2c.take().is_some() {
            log::debug!("Released I2C device {:#04x}", self.address);
        }
    }
}

/// Reject duties the board would misread; bytes above 100 are commands.
pub fn check_speed(speed: u8) -> Result<u8> {
    if speed > MAX_SPEED {
        return Err(Error::Bus(format!("fan speed {speed} % out of range (0-{MAX_SPEED})")));
    }
    Ok(speed)
}


#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// What a [`RecordingBus`] saw, in order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum BusOp {
        Speed(u8),
        Poweroff,
        Release,
    }

    /// In-memory bus that records every operation and can be told to fail.
    #[derive(Debug, Default)]
    pub struct RecordingBus {
        pub ops: Vec<BusOp>,
        pub fail_writes: bool,
    }

    impl RecordingBus {
        pub fn speeds(&self) -> Vec<u8> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    BusOp::Speed(s) => Some(*s),
                    _ => None,
                })
                .collect()
        }
    }

    impl FanBus for RecordingBus {
        fn write_speed(&mut self, speed: u8) -> Result<()> {
            self.ops.push(BusOp::Speed(speed));
            if self.fail_writes {
                return Err(Error::Bus("remote I/O error".to_string()));
            }
            Ok(())
        }

        fn request_poweroff(&mut self) -> Result<()> {
            self.ops.push(BusOp::Poweroff);
            Ok(())
        }

        fn release(&mut self) {
            self.ops.push(BusOp::Release);
        }
    }
}
