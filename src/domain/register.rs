// Immutable measured-value types: raw, time-stamped and normalized readings
use chrono::{DateTime, Utc};

use crate::domain::normalize::ResolutionDivider;
use crate::domain::unit::Unit;

/// Device id carried by synthetic readings produced by combining or deriving
/// series; no physical device ever reports under this id.
pub const CALCULATED_DEVICE_ID: &str = "calculated";

/// A measured quantity as a scaled integer: `value * 10^scale` in `unit`.
/// Derived quantities are always new instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterValue {
    value: i64,
    scale: i8,
    unit: Unit,
}

impl RegisterValue {
    pub fn new(value: i64, scale: i8, unit: Unit) -> Self {
        Self { value, scale, unit }
    }

    /// Encode an already-computed quantity (e.g. a rate) with milli precision.
    pub fn from_f64(value: f64, unit: Unit) -> Self {
        Self {
            value: (value * 1000.0).round() as i64,
            scale: -3,
            unit,
        }
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn as_f64(&self) -> f64 {
        self.value as f64 * 10f64.powi(self.scale as i32)
    }

    /// Rescale both operands to the finer of the two scales so addition and
    /// subtraction stay in integer arithmetic. Scales are producer-supplied;
    /// a spread whose factor exceeds i64 saturates instead of overflowing.
    fn aligned(self, other: Self) -> (i64, i64, i8) {
        let scale = self.scale.min(other.scale);
        let left = rescaled(self.value, (self.scale as i32 - scale as i32) as u32);
        let right = rescaled(other.value, (other.scale as i32 - scale as i32) as u32);
        (left, right, scale)
    }

    /// Sum, keeping this value's unit. Callers align units beforehand; the
    /// expression join and the generators only combine same-unit values.
    pub fn add(self, other: Self) -> Self {
        let (left, right, scale) = self.aligned(other);
        Self::new(left.saturating_add(right), scale, self.unit)
    }

    pub fn subtract(self, other: Self) -> Self {
        let (left, right, scale) = self.aligned(other);
        Self::new(left.saturating_sub(right), scale, self.unit)
    }

    /// Zero in this value's scale and unit, the reset baseline the
    /// generators emit on sequence starts and device transitions.
    pub fn zero(self) -> Self {
        Self::new(0, self.scale, self.unit)
    }
}

fn rescaled(value: i64, shift: u32) -> i64 {
    if value == 0 {
        return 0;
    }
    10i64
        .checked_pow(shift)
        .and_then(|factor| value.checked_mul(factor))
        .unwrap_or(if value > 0 { i64::MAX } else { i64::MIN })
}

/// A reading as ingested: which device produced it, when (UTC), and what it
/// measured.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRegisterValue {
    device_id: String,
    timestamp: DateTime<Utc>,
    value: RegisterValue,
}

impl TimeRegisterValue {
    pub fn new(device_id: &str, timestamp: DateTime<Utc>, value: RegisterValue) -> Self {
        Self {
            device_id: device_id.to_string(),
            timestamp,
            value,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn value(&self) -> RegisterValue {
        self.value
    }

    pub fn unit(&self) -> Unit {
        self.value.unit()
    }

    pub fn normalize(&self, divider: &ResolutionDivider) -> NormalizedTimeRegisterValue {
        NormalizedTimeRegisterValue {
            normalized_timestamp: divider.apply(self.timestamp),
            inner: self.clone(),
        }
    }
}

/// A reading plus its timestamp floored to the divider grid. The normalized
/// timestamp is a pure function of the original timestamp and the divider,
/// so re-normalizing the same reading is idempotent.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTimeRegisterValue {
    inner: TimeRegisterValue,
    normalized_timestamp: DateTime<Utc>,
}

impl NormalizedTimeRegisterValue {
    pub fn new(inner: TimeRegisterValue, normalized_timestamp: DateTime<Utc>) -> Self {
        Self {
            inner,
            normalized_timestamp,
        }
    }

    pub fn device_id(&self) -> &str {
        self.inner.device_id()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.inner.timestamp()
    }

    pub fn normalized_timestamp(&self) -> DateTime<Utc> {
        self.normalized_timestamp
    }

    pub fn value(&self) -> RegisterValue {
        self.inner.value()
    }

    pub fn unit(&self) -> Unit {
        self.inner.unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_as_f64_applies_scale() {
        let v = RegisterValue::new(1234, -2, Unit::CubicMetre);
        assert_eq!(v.as_f64(), 12.34);
    }

    #[test]
    fn test_subtract_aligns_scales() {
        let a = RegisterValue::new(15, 0, Unit::WattHour);
        let b = RegisterValue::new(1250, -2, Unit::WattHour);
        let d = a.subtract(b);
        assert_eq!(d.as_f64(), 2.5);
        assert_eq!(d.unit(), Unit::WattHour);
    }

    #[test]
    fn test_add_keeps_left_unit() {
        let a = RegisterValue::new(100, 0, Unit::WattHour);
        let b = RegisterValue::new(150, 0, Unit::WattHour);
        assert_eq!(a.add(b).as_f64(), 250.0);
    }

    #[test]
    fn test_extreme_scale_spread_saturates() {
        // Scales are i8s straight from device payloads; a pathological
        // spread must not panic on the rescaling factor.
        let a = RegisterValue::new(3, 120, Unit::WattHour);
        let b = RegisterValue::new(2, -120, Unit::WattHour);
        let d = a.subtract(b);
        assert_eq!(d.unit(), Unit::WattHour);
        assert!(d.as_f64() > 0.0);
        assert!(b.subtract(a).as_f64() < 0.0);
        assert_eq!(a.add(b).unit(), Unit::WattHour);
    }

    #[test]
    fn test_normalize_is_idempotent_on_timestamp() {
        let divider = ResolutionDivider::new("1-days").unwrap();
        let t = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        let reading = TimeRegisterValue::new("m1", t, RegisterValue::new(1, 0, Unit::WattHour));
        let normalized = reading.normalize(&divider);
        assert_eq!(
            normalized.normalized_timestamp(),
            divider.apply(normalized.normalized_timestamp())
        );
        assert_eq!(normalized.timestamp(), t);
    }
}
