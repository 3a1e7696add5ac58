mod capture;
mod telemetry;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leptonic::cci::{device::I2cBus, AgcMode, CciChannel};
use leptonic::Config;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// JSON config file. Settings not in the file use their defaults.
    #[arg(short, long, global = true, value_name = "path")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Switch {
    On,
    Off,
}

impl clap::ValueEnum for Switch {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::On, Self::Off]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::On => Some(clap::builder::PossibleValue::new("on")),
            Self::Off => Some(clap::builder::PossibleValue::new("off")),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize with the video stream and summarize captured frames.
    Capture {
        /// Number of frames to capture.
        #[arg(short = 'n', long, default_value_t = 10)]
        frames: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: Format,
    },
    /// Enable telemetry, capture one frame and show its decoded telemetry.
    ///
    /// Telemetry is disabled again afterwards.
    Telemetry {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: Format,
    },
    /// Run a flat-field correction.
    Ffc,
    /// Turn automatic gain control on or off.
    Agc { state: Switch },
    /// Show time since the sensor booted.
    Uptime,
}

fn open_cci(config: &Config) -> Result<CciChannel<I2cBus>> {
    let bus = I2cBus::open(&config.i2c_device)
        .with_context(|| format!("opening control bus {:?}", config.i2c_device))?;
    Ok(CciChannel::new(bus, config.cci_opts()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_env("LEPTONIC_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading config {path:?}"))?
        }
        None => Config::default(),
    };
    debug!("{config:?}");

    match cli.command {
        Commands::Capture { frames, format } => capture::capture(&config, frames, format),
        Commands::Telemetry { format } => {
            let mut cci = open_cci(&config)?;
            telemetry::telemetry(&config, &mut cci, format)
        }
        Commands::Ffc => {
            open_cci(&config)?.run_ffc().context("running FFC")?;
            info!("FFC complete");
            Ok(())
        }
        Commands::Agc { state } => {
            let mode = match state {
                Switch::On => AgcMode::Enabled,
                Switch::Off => AgcMode::Disabled,
            };
            let mut cci = open_cci(&config)?;
            cci.set_agc_mode(mode).context("setting AGC mode")?;
            info!("AGC {:?}", cci.agc_mode().context("reading AGC mode")?);
            Ok(())
        }
        Commands::Uptime => {
            let uptime = open_cci(&config)?.uptime().context("reading uptime")?;
            println!("{uptime} ms ({:.1} s)", f64::from(uptime) / 1000.0);
            Ok(())
        }
    }
}
