// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! pfcd: system service that runs the fan loop and the power button loop
//! side by side until SIGINT or SIGTERM.

use clap::Parser;
use pfcd::bus::I2cFan;
use pfcd::config::{self, Config, FanConfig, PowerConfig};
use pfcd::fan::FanController;
use pfcd::gpio::ButtonPin;
use pfcd::power::{PulseDecoder, SystemCommands};
use pfcd::sensor::ThermalZone;
use pfcd::stop::{self, StopReason, StopToken};
use pfcd::supervisor::{LoopExit, Supervisor};
use pfcd::thresholds;
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::thread;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "pfcd", about = "Power button and fan control daemon")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Override the fan threshold table path.
    #[arg(short, long)]
    thresholds: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let config_path = config::resolve_config_path(Some(&cli.config));
    let mut cfg = config::load_config(&config_path).unwrap_or_else(|e| {
        log::warn!("Could not load config: {e}, using defaults");
        Config::default()
    });
    if let Some(path) = cli.thresholds {
        cfg.fan.thresholds_path = path;
    }

    // Registered before the loops start so an early signal can't kill the
    // process without cleanup.
    let mut signals = Signals::new(StopReason::SIGNALS)?;
    let signal_handle = signals.handle();

    let mut supervisor = Supervisor::new();
    let Config { fan, power } = cfg;
    supervisor.spawn("fan_ctrl", move |stop| run_fan(&fan, &stop))?;
    if let Err(e) = supervisor.spawn("pwr_ctrl", move |stop| run_power(&power, &stop)) {
        supervisor.shutdown();
        return Err(e.into());
    }

    let stopper = supervisor.stopper();
    let signal_thread = thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                log::info!("Received {}", stop::signal_name(sig));
                if let Some(reason) = StopReason::from_signal(sig) {
                    stopper.request(reason);
                }
            }
        });
    let signal_thread = match signal_thread {
        Ok(handle) => handle,
        Err(e) => {
            supervisor.shutdown();
            return Err(e.into());
        }
    };

    let exits = supervisor.join();

    signal_handle.close();
    if signal_thread.join().is_err() {
        log::warn!("Signal thread panicked");
    }

    let failed: Vec<&str> = exits
        .iter()
        .filter(|(_, exit)| !matches!(exit, LoopExit::Stopped))
        .map(|(name, _)| name.as_str())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("Control loop(s) failed: {}", failed.join(", "));
    }

    log::info!("Daemon shutting down");
    Ok(())
}

// ---------------------------------------------------------------------------
// Control loops
// ---------------------------------------------------------------------------

fn run_fan(cfg: &FanConfig, stop: &StopToken) -> pfcd::Result<()> {
    let thresholds = thresholds::load_or_default(&cfg.thresholds_path);
    let bus = I2cFan::open(cfg.i2c_bus, cfg.address)?;
    let sensor = ThermalZone::new(cfg.sensor_path.clone());

    FanController::new(bus, sensor, thresholds)
        .with_interval(cfg.poll_interval())
        .with_self_test(cfg.self_test.clone())
        .with_max_sensor_failures(cfg.max_sensor_failures)
        .run(stop)
}

fn run_power(cfg: &PowerConfig, stop: &StopToken) -> pfcd::Result<()> {
    let pin = ButtonPin::open(cfg.gpio_pin, cfg.debounce())?;
    let runner = SystemCommands::new(cfg.dry_run);

    PulseDecoder::new(pin, runner, cfg.pulse_threshold()).run(stop)
}
