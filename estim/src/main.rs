/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use estim::registers::parse_u8;
use estim::{Config, Et232, KnobQueue, Register, Setting};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Command-line control for the ET232.
///
/// Example:
///   estim-cli -p /dev/ttyUSB0 write ModeOverride ModeIntense
///   estim-cli ramp PotA 0.2 0.4 --duration-ms 3000
#[derive(Debug, Parser)]
#[command(
    name = "estim-cli",
    about = "ET232 serial control – register access, handshake and ramps",
    long_about = None,
)]
struct Cli {
    /// Serial port of the device (overrides the configuration file).
    #[arg(short = 'p', long = "port")]
    port: Option<String>,

    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Skip the liveness probe / handshake before running the command.
    #[arg(long = "skip-handshake", default_value_t = false)]
    skip_handshake: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read registers. Ex: read PotA 0x11
    Read {
        #[arg(required = true)]
        registers: Vec<Register>,
    },

    /// Write a register by setting name or raw byte. Ex: write PotA 0x50, write ModeOverride ModeRamp
    Write { register: Register, value: String },

    /// Display the current device settings.
    Info,

    /// Wait for the power-on handshake (power-cycle the device while this runs).
    Handshake,

    /// Sweep a register between two normalized values.
    Ramp {
        register: Register,
        start: f64,
        end: f64,
        #[arg(long = "duration-ms", default_value_t = 3_000)]
        duration_ms: u64,
    },

    /// Set a register to a normalized value and hold it.
    Pulse {
        register: Register,
        value: f64,
        #[arg(long = "hold-ms", default_value_t = 1_000)]
        hold_ms: u64,
    },

    /// Force ModeIntense with both pots at LEVEL, hold, then release the overrides.
    Demo {
        #[arg(long = "level", default_value_t = 80)]
        level: u8,
        #[arg(long = "hold-ms", default_value_t = 10_000)]
        hold_ms: u64,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=estim=trace).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Load configuration ────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => {
            warn!("No configuration file provided, using default link and register settings");
            Config::default()
        }
    };
    if let Some(port) = cli.port {
        config.link.port = port;
    }

    info!(
        port         = %config.link.port,
        baud_rate    = config.link.baud_rate,
        read_timeout = ?config.link.read_timeout(),
        "Configuration"
    );

    let device = Arc::new(Et232::open(&config)?);

    // ── Connection bring-up ───────────────────────────────────────────────────
    let explicit_handshake = matches!(cli.command, Command::Handshake);
    if !cli.skip_handshake && !explicit_handshake {
        device
            .handshake_if_needed()
            .await
            .context("Device is not responding")?;
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────
    match cli.command {
        Command::Read { registers } => {
            for register in registers {
                let value = device.read(register).await?;
                println!("{register}: 0x{value:02X}");
            }
        }
        Command::Write { register, value } => write_value(&device, register, &value).await?,
        Command::Info => println!("{}", device.info().await?),
        Command::Handshake => {
            device.handshake().await?;
            println!("Handshake complete");
        }
        Command::Ramp {
            register,
            start,
            end,
            duration_ms,
        } => {
            let queue = KnobQueue::new(Arc::new(device.new_knob(register)));
            queue.ramp(start, end, Duration::from_millis(duration_ms));
            info!("Ramping {register} from {start} to {end} ({} step(s))", queue.pending());
            queue.wait_done().await;
        }
        Command::Pulse {
            register,
            value,
            hold_ms,
        } => {
            let queue = KnobQueue::new(Arc::new(device.new_knob(register)));
            queue.pulse(value, Duration::from_millis(hold_ms));
            queue.wait_done().await;
        }
        Command::Demo { level, hold_ms } => {
            run_demo(&device, level, Duration::from_millis(hold_ms)).await?
        }
    }

    Ok(())
}

/// Takes over the front panel, holds both channels at `level`, then hands
/// control back.  The overrides are released even if a pot write fails.
async fn run_demo(device: &Et232, level: u8, hold: Duration) -> Result<()> {
    device
        .write_setting(Register::MODE_OVERRIDE, Setting::ModeIntense)
        .await?;
    device
        .write_setting(Register::ANALOG_OVERRIDE, Setting::OverrideAll)
        .await?;

    let driven = async {
        device.write(Register::POT_A, level).await?;
        device.write(Register::POT_B, level).await?;
        info!("Holding A and B at {level} for {hold:?}");
        tokio::time::sleep(hold).await;
        Ok::<_, estim::DeviceError>(())
    }
    .await;

    // Without this the device can only be switched off by removing power.
    device
        .write_setting(Register::MODE_OVERRIDE, Setting::OverrideOff)
        .await?;
    device
        .write_setting(Register::ANALOG_OVERRIDE, Setting::OverrideOff)
        .await?;
    driven?;
    Ok(())
}

/// Writes `value` as a named setting if it is one, otherwise as a raw byte.
async fn write_value(device: &Et232, register: Register, value: &str) -> Result<()> {
    if let Ok(setting) = value.parse::<Setting>() {
        device.write_setting(register, setting).await?;
        return Ok(());
    }
    let Some(raw) = parse_u8(value) else {
        bail!("'{value}' is neither a setting name nor a byte value");
    };
    device.write(register, raw).await?;
    Ok(())
}
