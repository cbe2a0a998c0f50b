//! Wattlog Hardware Library
//!
//! Provides hardware abstraction for the INA219 current/power monitor on a
//! Linux I2C bus, plus the `PowerSensor` capability trait the collector
//! polls through.

pub mod error;
pub mod ina219;
pub mod sensor;

pub use error::{Error, Result};
pub use ina219::Ina219;
pub use sensor::PowerSensor;

/// Default shunt resistor value in ohms.
pub const DEFAULT_SHUNT_OHMS: f64 = 0.1;

/// Default Linux I2C bus number (/dev/i2c-1).
pub const DEFAULT_I2C_BUS: u8 = 1;
