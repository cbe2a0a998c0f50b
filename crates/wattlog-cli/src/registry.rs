//! Sensor registry: ordered label-to-handle mapping built once at startup.

use std::collections::HashSet;
use std::num::ParseIntError;

use thiserror::Error;
use tracing::debug;
use wattlog_hw::{Ina219, PowerSensor};

/// Configuration errors that prevent the registry from being built.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No sensor entries were supplied.
    #[error("at least one sensor must be configured")]
    NoSensors,

    /// A sensor entry had an empty label.
    #[error("sensor label must not be empty")]
    EmptyLabel,

    /// Two entries share the same label.
    #[error("duplicate sensor label: '{0}'")]
    DuplicateLabel(String),

    /// A sensor address could not be parsed as hex.
    #[error("invalid I2C address '{value}' for sensor '{label}': {source}")]
    InvalidAddress {
        label: String,
        value: String,
        source: ParseIntError,
    },

    /// A sensor device could not be initialized.
    #[error("failed to initialize sensor '{label}' at 0x{address:02x}: {source}")]
    Device {
        label: String,
        address: u16,
        source: wattlog_hw::Error,
    },
}

/// One configured sensor entry: label plus I2C address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSpec {
    pub label: String,
    pub address: u16,
}

impl SensorSpec {
    /// Parses a (label, hex address) pair. The address accepts an optional
    /// `0x` prefix, e.g. both `0x40` and `40` mean address 0x40.
    pub fn parse(label: &str, address: &str) -> Result<Self, ConfigError> {
        if label.is_empty() {
            return Err(ConfigError::EmptyLabel);
        }
        let digits = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
            .unwrap_or(address);
        let address_value =
            u16::from_str_radix(digits, 16).map_err(|source| ConfigError::InvalidAddress {
                label: label.to_string(),
                value: address.to_string(),
                source,
            })?;
        Ok(Self {
            label: label.to_string(),
            address: address_value,
        })
    }
}

/// Ordered mapping from sensor label to an open sensor handle.
///
/// Built once at startup and immutable thereafter (readings need `&mut`
/// access to the handles, but the set and its order never change).
/// Iteration order matches configuration order and determines both the
/// polling order within a round and the row order in the log.
pub struct SensorRegistry {
    sensors: Vec<(String, Box<dyn PowerSensor>)>,
}

impl SensorRegistry {
    /// Opens and configures every entry. Fails on the first entry that
    /// cannot be initialized; no partial registry is returned.
    pub fn open(specs: &[SensorSpec], bus: u8, shunt_ohms: f64) -> Result<Self, ConfigError> {
        Self::check_labels(specs)?;
        let mut sensors: Vec<(String, Box<dyn PowerSensor>)> = Vec::with_capacity(specs.len());
        for spec in specs {
            let ina = Ina219::open(bus, spec.address, shunt_ohms).map_err(|source| {
                ConfigError::Device {
                    label: spec.label.clone(),
                    address: spec.address,
                    source,
                }
            })?;
            debug!("registered sensor '{}' at 0x{:02x}", spec.label, spec.address);
            sensors.push((spec.label.clone(), Box::new(ina)));
        }
        Ok(Self { sensors })
    }

    /// Builds a registry from already-open handles, preserving order.
    pub fn from_handles(sensors: Vec<(String, Box<dyn PowerSensor>)>) -> Self {
        Self { sensors }
    }

    fn check_labels(specs: &[SensorSpec]) -> Result<(), ConfigError> {
        if specs.is_empty() {
            return Err(ConfigError::NoSensors);
        }
        let mut seen = HashSet::new();
        for spec in specs {
            if spec.label.is_empty() {
                return Err(ConfigError::EmptyLabel);
            }
            if !seen.insert(spec.label.as_str()) {
                return Err(ConfigError::DuplicateLabel(spec.label.clone()));
            }
        }
        Ok(())
    }

    /// Number of registered sensors.
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Labels in registration order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.sensors.iter().map(|(label, _)| label.as_str())
    }

    /// Mutable iteration over (label, handle) pairs in registration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut (dyn PowerSensor + 'static))> {
        self.sensors
            .iter_mut()
            .map(|(label, sensor)| (label.as_str(), sensor.as_mut()))
    }
}
