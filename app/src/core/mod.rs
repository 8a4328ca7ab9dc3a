pub mod error;
pub mod unit;

use serde::Serialize;

use unit::DegreeCelsius;

/// Price-based directive for the current hour: cheap electricity means heat,
/// expensive means idle at the low setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceInstruction {
    Heat,
    Idle,
}

/// What the device reported when it was last polled. Either value may be
/// missing, the cloud API omits them while the spa is unreachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub reported_setpoint: Option<DegreeCelsius>,
    pub measured_temperature: Option<DegreeCelsius>,
}
