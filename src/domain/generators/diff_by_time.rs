// Cross-register difference at matching normalized time slots
use crate::domain::obis::ObisCode;
use crate::domain::register::{CALCULATED_DEVICE_ID, NormalizedTimeRegisterValue, TimeRegisterValue};

/// Difference between two configured registers (minuend - subtrahend) at
/// time slots where both are present. Entries pair up only when their
/// normalized timestamp and unit match exactly; both inputs come from the
/// same divider, so slot equality is window equality. Negative results are
/// clamped to zero - this clamp is intentional here, unlike template
/// subtraction.
#[derive(Debug)]
pub struct DiffByTimeGenerator {
    minuend: ObisCode,
    subtrahend: ObisCode,
    pending_minuends: Vec<NormalizedTimeRegisterValue>,
    pending_subtrahends: Vec<NormalizedTimeRegisterValue>,
    generated: Vec<NormalizedTimeRegisterValue>,
}

impl DiffByTimeGenerator {
    pub fn new(minuend: ObisCode, subtrahend: ObisCode) -> Self {
        Self {
            minuend,
            subtrahend,
            pending_minuends: Vec::new(),
            pending_subtrahends: Vec::new(),
            generated: Vec::new(),
        }
    }

    pub fn calculate_next(&mut self, register: ObisCode, value: &NormalizedTimeRegisterValue) {
        if register == self.minuend {
            self.pending_minuends.push(value.clone());
        } else if register == self.subtrahend {
            self.pending_subtrahends.push(value.clone());
        } else {
            return;
        }
        self.pair_up();
    }

    fn pair_up(&mut self) {
        while let Some((m_index, s_index)) = self.next_match() {
            let minuend = self.pending_minuends.remove(m_index);
            let subtrahend = self.pending_subtrahends.remove(s_index);
            let difference = minuend.value().subtract(subtrahend.value());
            let clamped = if difference.as_f64() < 0.0 {
                difference.zero()
            } else {
                difference
            };
            self.generated.push(NormalizedTimeRegisterValue::new(
                TimeRegisterValue::new(CALCULATED_DEVICE_ID, minuend.timestamp(), clamped),
                minuend.normalized_timestamp(),
            ));
        }
    }

    fn next_match(&self) -> Option<(usize, usize)> {
        for (m_index, m) in self.pending_minuends.iter().enumerate() {
            let found = self.pending_subtrahends.iter().position(|s| {
                s.normalized_timestamp() == m.normalized_timestamp() && s.unit() == m.unit()
            });
            if let Some(s_index) = found {
                return Some((m_index, s_index));
            }
        }
        None
    }

    pub fn generated(&self) -> &[NormalizedTimeRegisterValue] {
        &self.generated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::register::RegisterValue;
    use crate::domain::unit::Unit;
    use chrono::{TimeZone, Utc};

    const IMPORT: ObisCode = ObisCode::ELECTR_ACTIVE_ENERGY_IMPORT;
    const EXPORT: ObisCode = ObisCode::ELECTR_ACTIVE_ENERGY_EXPORT;

    fn slot(day: u32, value: i64, unit: Unit) -> NormalizedTimeRegisterValue {
        let normalized = Utc.with_ymd_and_hms(2026, 5, day, 0, 0, 0).unwrap();
        NormalizedTimeRegisterValue::new(
            TimeRegisterValue::new(
                "m1",
                normalized + chrono::Duration::minutes(7),
                RegisterValue::new(value, 0, unit),
            ),
            normalized,
        )
    }

    #[test]
    fn test_positive_difference() {
        let mut generator = DiffByTimeGenerator::new(IMPORT, EXPORT);
        generator.calculate_next(IMPORT, &slot(1, 150, Unit::WattHour));
        generator.calculate_next(EXPORT, &slot(1, 100, Unit::WattHour));
        assert_eq!(generator.generated().len(), 1);
        assert_eq!(generator.generated()[0].value().as_f64(), 50.0);
        assert_eq!(generator.generated()[0].device_id(), CALCULATED_DEVICE_ID);
    }

    #[test]
    fn test_negative_difference_clamps_to_zero() {
        let mut generator = DiffByTimeGenerator::new(IMPORT, EXPORT);
        generator.calculate_next(IMPORT, &slot(1, 100, Unit::WattHour));
        generator.calculate_next(EXPORT, &slot(1, 150, Unit::WattHour));
        assert_eq!(generator.generated().len(), 1);
        assert_eq!(generator.generated()[0].value().as_f64(), 0.0);
    }

    #[test]
    fn test_only_matching_slot_and_unit_pair_up() {
        let mut generator = DiffByTimeGenerator::new(IMPORT, EXPORT);
        generator.calculate_next(IMPORT, &slot(1, 150, Unit::WattHour));
        generator.calculate_next(EXPORT, &slot(2, 100, Unit::WattHour));
        generator.calculate_next(EXPORT, &slot(1, 100, Unit::CubicMetre));
        assert!(generator.generated().is_empty());
        generator.calculate_next(EXPORT, &slot(1, 100, Unit::WattHour));
        assert_eq!(generator.generated().len(), 1);
    }

    #[test]
    fn test_unrelated_registers_ignored() {
        let mut generator = DiffByTimeGenerator::new(IMPORT, EXPORT);
        generator.calculate_next(ObisCode::COLD_WATER_VOLUME, &slot(1, 1, Unit::CubicMetre));
        assert!(generator.generated().is_empty());
    }
}
