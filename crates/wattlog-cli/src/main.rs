//! Wattlog Collector
//!
//! Polls a set of INA219 power sensors as fast as they allow and appends
//! every completed round to a resumable CSV log.

mod collector;
mod logfile;
mod registry;
mod sample;
mod supervisor;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use logfile::PersistentLog;
use registry::{ConfigError, SensorRegistry, SensorSpec};
use supervisor::{CancelFlag, SessionError, Supervisor};

#[derive(Parser)]
#[command(name = "wattlog")]
#[command(about = "Continuous multi-sensor power telemetry collector")]
#[command(version)]
struct Cli {
    /// Name of the csv file (without extension)
    #[arg(short, long, default_value = "test")]
    filename: String,

    /// Sensor label and hex I2C address pair (ex: -t cpu 0x40), repeatable
    #[arg(
        short = 't',
        long = "test",
        num_args = 2,
        value_names = ["LABEL", "ADDR"],
        required = true
    )]
    tests: Vec<String>,

    /// Print a fixed-width progress line for every round
    #[arg(short, long)]
    verbose: bool,

    /// Output directory for test results
    #[arg(short, long)]
    output: PathBuf,

    /// I2C bus number the sensors are attached to
    #[arg(long, default_value_t = wattlog_hw::DEFAULT_I2C_BUS)]
    bus: u8,

    /// Shunt resistor value in ohms
    #[arg(long, default_value_t = wattlog_hw::DEFAULT_SHUNT_OHMS)]
    shunt_ohms: f64,
}

fn parse_specs(pairs: &[String]) -> std::result::Result<Vec<SensorSpec>, ConfigError> {
    pairs
        .chunks_exact(2)
        .map(|pair| SensorSpec::parse(&pair[0], &pair[1]))
        .collect()
}

/// Exit diagnostic for a sensor fault: range faults keep the device-range
/// wording, anything else (e.g. an I2C bus failure) gets a neutral one.
fn fault_message(err: &collector::ReadError) -> String {
    if err.source.is_range_error() {
        format!("Error in device's range: {err}, program shutting down")
    } else {
        format!("Sensor read failed: {err}, program shutting down")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let specs = parse_specs(&cli.tests)?;
    let registry = SensorRegistry::open(&specs, cli.bus, cli.shunt_ohms)
        .context("Failed to initialize sensors")?;
    let log = PersistentLog::create(&cli.output, &cli.filename)
        .context("Failed to prepare output directory")?;
    let log_path = log.path().to_path_buf();

    if cli.verbose {
        print!("TEST SENSORS => ");
        for spec in &specs {
            print!(" {}: 0x{:x}", spec.label, spec.address);
        }
        println!();
    }

    // Cancellation is cooperative: the signal task sets the flag and the
    // supervisor observes it at the next round boundary.
    let cancel = CancelFlag::new();
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => debug!("received SIGINT"),
                _ = sigterm.recv() => debug!("received SIGTERM"),
            }
            println!("User ended program run");
            println!("Writing to csv file...please wait");
            cancel.cancel();
        });
    }

    let supervisor = Supervisor::new(registry, log, cancel, cli.verbose);
    let result = tokio::task::spawn_blocking(move || supervisor.run())
        .await
        .context("Sampling task panicked")?;

    match result {
        Ok(summary) => {
            println!(
                "Wrote {} rows over {} rounds to {}",
                summary.samples,
                summary.rounds,
                log_path.display()
            );
            Ok(())
        }
        Err(SessionError::Sensor(dev_err)) => {
            eprintln!("{}", fault_message(&dev_err));
            std::process::exit(1);
        }
        Err(err @ SessionError::Log(_)) => Err(err).context("Failed to flush samples"),
    }
}
