// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! pfcd-shutdown: systemd shutdown hook that stops the fan and, on
//! poweroff/halt, tells the board to cut power.
//!
//! Install into `/usr/lib/systemd/system-shutdown/`.

use clap::Parser;
use pfcd::bus::I2cFan;
use pfcd::config::{self, Config};
use pfcd::hook::{self, ShutdownMode};

#[derive(Parser, Debug)]
#[command(name = "pfcd-shutdown", about = "Fan/power hook for the end of system shutdown")]
struct Cli {
    /// Shutdown verb passed by systemd (poweroff, halt, reboot, kexec).
    mode: Option<String>,

    /// Path to the configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log filter used when RUST_LOG is not set.
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let Some(verb) = cli.mode else {
        log::debug!("No shutdown verb given, nothing to do");
        return Ok(());
    };
    let mode = ShutdownMode::parse(&verb);
    if mode.is_none() {
        log::warn!("Unknown shutdown verb {verb:?}, only stopping the fan");
    }

    let cfg = config::load_config(&config::resolve_config_path(Some(&cli.config)))
        .unwrap_or_else(|e| {
            log::warn!("Could not load config: {e}, using defaults");
            Config::default()
        });

    let mut bus = I2cFan::open(cfg.fan.i2c_bus, cfg.fan.address)?;
    hook::run(&mut bus, mode)?;
    Ok(())
}
