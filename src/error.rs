// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Error types shared by the control loops.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse settings {path}: {message}")]
    Settings { path: PathBuf, message: String },

    #[error("Failed to read temperature from {path}: {reason}")]
    SensorRead { path: PathBuf, reason: String },

    #[error("I2C error: {0}")]
    Bus(String),

    #[error("GPIO error: {0}")]
    Gpio(String),
}

impl From<rppal::i2c::Error> for Error {
    fn from(e: rppal::i2c::Error) -> Self {
        Error::Bus(e.to_string())
    }
}

impl From<rppal::gpio::Error> for Error {
    fn from(e: rppal::gpio::Error) -> Self {
        Error::Gpio(e.to_string())
    }
}
