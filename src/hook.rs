// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Late shutdown hook.
//!
//! systemd runs executables in `system-shutdown` with the shutdown verb as
//! their first argument after all services have stopped. The hook stops
//! the fan and, on poweroff/halt, asks the board to cut power.

use crate::bus::FanBus;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    Poweroff,
    Halt,
    Reboot,
    Kexec,
}

impl ShutdownMode {
    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "poweroff" => Some(ShutdownMode::Poweroff),
            "halt" => Some(ShutdownMode::Halt),
            "reboot" => Some(ShutdownMode::Reboot),
            "kexec" => Some(ShutdownMode::Kexec),
            _ => None,
        }
    }

    /// Whether the board should remove power after the host stops.
    pub fn cuts_power(self) -> bool {
        matches!(self, ShutdownMode::Poweroff | ShutdownMode::Halt)
    }
}

/// Stop the fan and, for poweroff/halt, send the poweroff request. A failed
/// poweroff request is only logged since the board may already be going
/// down. The bus is released before returning.
pub fn run<B: FanBus>(bus: &mut B, mode: Option<ShutdownMode>) -> Result<()> {
    let result = stop_fan(bus, mode);
    bus.release();
    result
}

fn stop_fan<B: FanBus>(bus: &mut B, mode: Option<ShutdownMode>) -> Result<()> {
    bus.write_speed(0)?;
    log::info!("Fan stopped");

    if mode.is_some_and(ShutdownMode::cuts_power) {
        match bus.request_poweroff() {
            Ok(()) => log::info!("Requested board poweroff"),
            Err(e) => log::debug!("Poweroff request not acknowledged: {e}"),
        }
    }
    Ok(())
}
