//! Polling: one round reads every registered sensor once.

use chrono::Local;
use thiserror::Error;

use crate::registry::SensorRegistry;
use crate::sample::Sample;

/// A sensor read failure, tagged with the sensor that raised it.
///
/// Read errors are not retried and not caught below the supervisor; the
/// round that hit one is abandoned and its partial samples dropped.
#[derive(Error, Debug)]
#[error("sensor '{label}' read failed: {source}")]
pub struct ReadError {
    pub label: String,
    #[source]
    pub source: wattlog_hw::Error,
}

fn tagged(label: &str) -> impl FnOnce(wattlog_hw::Error) -> ReadError + '_ {
    move |source| ReadError {
        label: label.to_string(),
        source,
    }
}

/// Polls every sensor once, in registry order, stamping each sample with
/// `run_id` and the wall-clock time captured just before its reads.
pub fn poll_round(run_id: u64, registry: &mut SensorRegistry) -> Result<Vec<Sample>, ReadError> {
    let mut samples = Vec::with_capacity(registry.len());
    for (label, sensor) in registry.iter_mut() {
        let at = Local::now();
        let power_mw = sensor.power_mw().map_err(tagged(label))?;
        let voltage_v = sensor.supply_voltage_v().map_err(tagged(label))?;
        let current_ma = sensor.current_ma().map_err(tagged(label))?;
        samples.push(Sample::new(
            run_id, label, at, power_mw, voltage_v, current_ma,
        ));
    }
    Ok(samples)
}
