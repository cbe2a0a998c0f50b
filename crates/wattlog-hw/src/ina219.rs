//! INA219 current/power monitor driver over the Linux I2C bus.

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use tracing::{debug, info};

use crate::sensor::PowerSensor;
use crate::{Error, Result};

/// Configuration register.
const REG_CONFIG: u8 = 0x00;
/// Shunt voltage register (signed, 10 uV/LSB).
const REG_SHUNT_VOLTAGE: u8 = 0x01;
/// Bus voltage register (4 mV/LSB in bits 15..3, overflow flag in bit 0).
const REG_BUS_VOLTAGE: u8 = 0x02;
/// Power register (power LSB = 20 x current LSB).
const REG_POWER: u8 = 0x03;
/// Current register (signed).
const REG_CURRENT: u8 = 0x04;
/// Calibration register.
const REG_CALIBRATION: u8 = 0x05;

/// 32 V bus range, /8 gain (320 mV shunt range), 12-bit conversions,
/// shunt and bus continuous mode.
const CONFIG_32V_320MV_CONTINUOUS: u16 = 0x399F;

/// Math overflow flag in the bus voltage register.
const OVERFLOW_FLAG: u16 = 0x0001;

const BUS_VOLTAGE_LSB_V: f64 = 0.004;
const SHUNT_VOLTAGE_LSB_V: f64 = 0.000_010;
/// Internal calibration scale constant from the datasheet.
const CALIBRATION_SCALE: f64 = 0.04096;
/// Full-scale shunt voltage at /8 gain, in volts.
const MAX_SHUNT_VOLTAGE_V: f64 = 0.32;

/// One INA219 device on an I2C bus.
pub struct Ina219 {
    dev: LinuxI2CDevice,
    address: u16,
    current_lsb_ma: f64,
}

impl Ina219 {
    /// Opens the device on `/dev/i2c-<bus>` and configures it for continuous
    /// conversion, calibrated for the given shunt resistor.
    pub fn open(bus: u8, address: u16, shunt_ohms: f64) -> Result<Self> {
        let path = format!("/dev/i2c-{bus}");
        let dev = LinuxI2CDevice::new(&path, address)?;
        let mut ina = Self {
            dev,
            address,
            current_lsb_ma: 0.0,
        };
        ina.configure(shunt_ohms)?;
        info!(
            "INA219 0x{:02x} on {} configured (shunt {} ohms)",
            address, path, shunt_ohms
        );
        Ok(ina)
    }

    /// Returns the device's I2C address.
    pub fn address(&self) -> u16 {
        self.address
    }

    fn configure(&mut self, shunt_ohms: f64) -> Result<()> {
        let (calibration, current_lsb_ma) = Self::calibration_for(shunt_ohms)?;
        self.write_register(REG_CONFIG, CONFIG_32V_320MV_CONTINUOUS)?;
        self.write_register(REG_CALIBRATION, calibration)?;
        self.current_lsb_ma = current_lsb_ma;
        debug!(
            "INA219 0x{:02x}: calibration {}, current LSB {:.4} mA",
            self.address, calibration, current_lsb_ma
        );
        Ok(())
    }

    /// Computes the calibration register value and the resulting current LSB
    /// (in mA) for a shunt resistor, sized for the full 320 mV shunt range.
    fn calibration_for(shunt_ohms: f64) -> Result<(u16, f64)> {
        if !(shunt_ohms.is_finite() && shunt_ohms > 0.0) {
            return Err(Error::InvalidShunt(shunt_ohms));
        }
        let max_current_a = MAX_SHUNT_VOLTAGE_V / shunt_ohms;
        let current_lsb_a = max_current_a / 32767.0;
        let calibration = (CALIBRATION_SCALE / (current_lsb_a * shunt_ohms)).trunc();
        if !(1.0..=f64::from(u16::MAX)).contains(&calibration) {
            return Err(Error::InvalidShunt(shunt_ohms));
        }
        Ok((calibration as u16, current_lsb_a * 1000.0))
    }

    /// Reads a 16-bit register. The INA219 is big-endian on the wire while
    /// SMBus word access is little-endian, hence the byte swap.
    fn read_register(&mut self, register: u8) -> Result<u16> {
        Ok(self.dev.smbus_read_word_data(register)?.swap_bytes())
    }

    fn write_register(&mut self, register: u8, value: u16) -> Result<()> {
        self.dev.smbus_write_word_data(register, value.swap_bytes())?;
        Ok(())
    }

    /// Reads the bus voltage register and fails if the math overflow flag is
    /// set, meaning current and power readings would be garbage.
    fn checked_bus_voltage_raw(&mut self) -> Result<u16> {
        let raw = self.read_register(REG_BUS_VOLTAGE)?;
        if raw & OVERFLOW_FLAG != 0 {
            return Err(Error::OutOfRange {
                address: self.address,
            });
        }
        Ok(raw)
    }

    fn bus_voltage_v(&mut self) -> Result<f64> {
        let raw = self.read_register(REG_BUS_VOLTAGE)?;
        Ok(f64::from(raw >> 3) * BUS_VOLTAGE_LSB_V)
    }

    fn shunt_voltage_v(&mut self) -> Result<f64> {
        let raw = self.read_register(REG_SHUNT_VOLTAGE)? as i16;
        Ok(f64::from(raw) * SHUNT_VOLTAGE_LSB_V)
    }
}

impl PowerSensor for Ina219 {
    fn power_mw(&mut self) -> Result<f64> {
        self.checked_bus_voltage_raw()?;
        let raw = self.read_register(REG_POWER)?;
        Ok(f64::from(raw) * self.current_lsb_ma * 20.0)
    }

    fn supply_voltage_v(&mut self) -> Result<f64> {
        Ok(self.bus_voltage_v()? + self.shunt_voltage_v()?)
    }

    fn current_ma(&mut self) -> Result<f64> {
        self.checked_bus_voltage_raw()?;
        let raw = self.read_register(REG_CURRENT)? as i16;
        Ok(f64::from(raw) * self.current_lsb_ma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_default_shunt() {
        let (calibration, current_lsb_ma) = Ina219::calibration_for(0.1).unwrap();
        // 3.2 A full scale over 32767 counts.
        assert_eq!(calibration, 4194);
        assert!((current_lsb_ma - 0.097_66).abs() < 0.000_01);
    }

    #[test]
    fn test_calibration_rejects_bad_shunt() {
        assert!(Ina219::calibration_for(0.0).is_err());
        assert!(Ina219::calibration_for(-0.1).is_err());
        assert!(Ina219::calibration_for(f64::NAN).is_err());
    }

    #[test]
    fn test_range_error_classification() {
        let err = Error::OutOfRange { address: 0x40 };
        assert!(err.is_range_error());
        assert_eq!(err.to_string(), "reading out of range on sensor 0x40");
    }
}
