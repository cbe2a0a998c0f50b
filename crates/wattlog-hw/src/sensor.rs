//! Power sensor capability trait.

use crate::Result;

/// Trait for anything that can be polled for power telemetry.
///
/// Readings take `&mut self` because bus access goes through a stateful
/// device handle. Implementations must be `Send` so a registry of handles
/// can move into the blocking sampling task.
pub trait PowerSensor: Send {
    /// Power drawn by the load, in milliwatts.
    fn power_mw(&mut self) -> Result<f64>;

    /// Supply voltage at the load, in volts.
    fn supply_voltage_v(&mut self) -> Result<f64>;

    /// Current through the shunt, in milliamps.
    fn current_ma(&mut self) -> Result<f64>;
}
