//! Error types for the wattlog hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a power sensor.
#[derive(Error, Debug)]
pub enum Error {
    /// I2C bus communication error.
    #[error("I2C error: {0}")]
    I2c(#[from] i2cdev::linux::LinuxI2CError),

    /// The measured value exceeded the range the sensor is configured for.
    /// The INA219 reports this through the math overflow flag.
    #[error("reading out of range on sensor 0x{address:02x}")]
    OutOfRange {
        /// I2C address of the offending sensor.
        address: u16,
    },

    /// Shunt resistor value that cannot be calibrated for.
    #[error("invalid shunt value: {0} ohms")]
    InvalidShunt(f64),
}

impl Error {
    /// Whether this error is a sensor range fault rather than a bus failure.
    pub fn is_range_error(&self) -> bool {
        matches!(self, Error::OutOfRange { .. })
    }
}
