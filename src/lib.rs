// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Power button and fan control for Raspberry Pi case boards.
//!
//! Two independent control loops run on their own threads:
//!
//! - [`fan::FanController`] polls the CPU temperature and sets the fan speed
//!   over I2C from a [`thresholds::ThresholdMap`].
//! - [`power::PulseDecoder`] times pulses on the button GPIO and reboots or
//!   powers off the host.
//!
//! [`supervisor::Supervisor`] starts both, forwards stop requests and joins
//! them. Hardware access goes through the [`bus::FanBus`],
//! [`sensor::TempSource`] and [`gpio::EdgeSource`] traits.

pub mod bus;
pub mod config;
pub mod error;
pub mod fan;
pub mod gpio;
pub mod hook;
pub mod power;
pub mod sensor;
pub mod stop;
pub mod supervisor;
pub mod thresholds;

pub use error::{Error, Result};
