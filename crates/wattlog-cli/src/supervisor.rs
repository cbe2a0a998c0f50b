//! Top-level control loop: poll until cancelled, then flush.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::collector::{poll_round, ReadError};
use crate::logfile::{LogError, PersistentLog};
use crate::registry::SensorRegistry;
use crate::sample::{Sample, CSV_COLUMNS};

/// Cooperative cancellation flag, observed at round boundaries only; a
/// sensor read in flight is never interrupted.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a graceful stop; the next round boundary diverts to the
    /// flush path instead of polling again.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session failures. A sensor fault deliberately aborts without flushing:
/// an out-of-range reading means the instrument state is untrustworthy, and
/// so is the data already buffered from it.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Sensor(#[from] ReadError),

    #[error(transparent)]
    Log(#[from] LogError),
}

/// What a flushed session wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Run identifier of the first round in this session.
    pub first_run_id: u64,
    /// Completed rounds.
    pub rounds: u64,
    /// Data rows flushed to the log.
    pub samples: usize,
}

/// Drives the collection session: owns the registry, the log, and the
/// in-memory sample buffer.
pub struct Supervisor {
    registry: SensorRegistry,
    log: PersistentLog,
    cancel: CancelFlag,
    verbose: bool,
}

impl Supervisor {
    pub fn new(
        registry: SensorRegistry,
        log: PersistentLog,
        cancel: CancelFlag,
        verbose: bool,
    ) -> Self {
        Self {
            registry,
            log,
            cancel,
            verbose,
        }
    }

    /// Runs the session to completion.
    ///
    /// Polls as fast as the sensors allow, buffering every completed round.
    /// On cancellation the whole buffer is flushed in one append and the
    /// session succeeds; on a read error the buffer is dropped unwritten.
    pub fn run(mut self) -> Result<Summary, SessionError> {
        let first_run_id = self.log.resume_id()?;
        info!(
            "sampling {} sensors into {}, starting at run id {}",
            self.registry.len(),
            self.log.path().display(),
            first_run_id
        );
        if self.verbose {
            print_progress_header();
        }

        let mut buffer: Vec<Sample> = Vec::new();
        let mut run_id = first_run_id;
        while !self.cancel.is_cancelled() {
            let samples = poll_round(run_id, &mut self.registry)?;
            if self.verbose {
                if let Some(last) = samples.last() {
                    print_round(last);
                }
            }
            buffer.extend(samples);
            run_id += 1;
        }

        self.log.ensure_header().map_err(LogError::Io)?;
        self.log.append(&buffer).map_err(LogError::Io)?;
        Ok(Summary {
            first_run_id,
            rounds: run_id - first_run_id,
            samples: buffer.len(),
        })
    }
}

/// Fixed-width column header for verbose progress output.
fn print_progress_header() {
    let [id, label, ts, dt, power, voltage, current] = CSV_COLUMNS;
    println!("{id:>7}{label:>15}{ts:>24}{dt:>30}{power:>12}{voltage:>20}{current:>12}");
}

/// Prints the round's last sample as one fixed-width progress line.
fn print_round(sample: &Sample) {
    println!(
        "{:>7}{:>15}{:>24}{:>30}{:12.4}{:20.4}{:12.4}",
        sample.run_id,
        sample.sensor_label,
        sample.timestamp_epoch,
        sample.timestamp_iso,
        sample.power_mw,
        sample.voltage_v,
        sample.current_ma
    );
}
