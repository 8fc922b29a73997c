// Measurement units and the actual-rate conversion table
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    WattHour,
    Watt,
    CubicMetre,
    CubicMetrePrHour,
    Joule,
    DegreeCentigrade,
    Percentage,
    /// Sentinel for units the engine cannot interpret, including the result
    /// of an actual-rate conversion from an unmapped accumulating unit.
    Unknown,
}

impl Unit {
    /// Rate unit for a reading in an accumulating unit, e.g. Wh readings
    /// yield W rates. Unmapped units yield the `Unknown` sentinel rather
    /// than an error; sparse or exotic device data is expected.
    pub fn actual_rate(self) -> Unit {
        match self {
            Unit::WattHour => Unit::Watt,
            Unit::CubicMetre => Unit::CubicMetrePrHour,
            _ => Unit::Unknown,
        }
    }

    /// Whether readings in this unit accumulate over time (meter counters),
    /// which is what makes delta/period/rate derivation meaningful.
    pub fn is_cumulative(self) -> bool {
        matches!(self, Unit::WattHour | Unit::CubicMetre | Unit::Joule)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::WattHour => write!(f, "Wh"),
            Unit::Watt => write!(f, "W"),
            Unit::CubicMetre => write!(f, "m3"),
            Unit::CubicMetrePrHour => write!(f, "m3/h"),
            Unit::Joule => write!(f, "J"),
            Unit::DegreeCentigrade => write!(f, "C"),
            Unit::Percentage => write!(f, "%"),
            Unit::Unknown => write!(f, ""),
        }
    }
}
