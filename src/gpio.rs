// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Power button input line.

use crate::error::{Error, Result};
use rppal::gpio::{Gpio, InputPin, Trigger};
use std::time::Duration;

/// BCM pin the board pulses when its button is pressed.
pub const DEFAULT_BUTTON_PIN: u8 = 4;

/// Direction of a level transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
}

/// A transition on the input line, stamped with a monotonic timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub kind: EdgeKind,
    pub at: Duration,
}

/// Source of timestamped edges on a single input line.
pub trait EdgeSource {
    /// Block until the next edge or `timeout`, whichever comes first.
    /// `Ok(None)` means the timeout expired.
    fn next_edge(&mut self, timeout: Duration) -> Result<Option<Edge>>;

    /// Drop the interrupt registration and the pin.
    fn release(&mut self);
}

/// rppal-backed button input with an internal pull-down and interrupts on
/// both edges.
pub struct ButtonPin {
    pin: Option<InputPin>,
    number: u8,
}

impl ButtonPin {
    pub fn open(number: u8, debounce: Option<Duration>) -> Result<Self> {
        let mut pin = Gpio::new()?.get(number)?.into_input_pulldown();
        pin.set_interrupt(Trigger::Both, debounce)?;
        log::debug!("Watching GPIO {number} for button pulses");
        Ok(Self {
            pin: Some(pin),
            number,
        })
    }
}

impl EdgeSource for ButtonPin {
    fn next_edge(&mut self, timeout: Duration) -> Result<Option<Edge>> {
        let Some(pin) = self.pin.as_mut() else {
            return Err(Error::Gpio(format!("GPIO {} already released", self.number)));
        };
        let Some(event) = pin.poll_interrupt(false, Some(timeout))? else {
            return Ok(None);
        };
        let kind = match event.trigger {
            Trigger::RisingEdge => EdgeKind::Rising,
            Trigger::FallingEdge => EdgeKind::Falling,
            other => {
                log::trace!("Ignoring {other:?} event on GPIO {}", self.number);
                return Ok(None);
            }
        };
        Ok(Some(Edge {
            kind,
            at: event.timestamp,
        }))
    }

    fn release(&mut self) {
        if let Some(mut pin) = self.pin.take() {
            if let Err(e) = pin.clear_interrupt() {
                log::warn!("Failed to clear interrupt on GPIO {}: {e}", self.number);
            }
            log::debug!("Released GPIO {}", self.number);
        }
    }
}
