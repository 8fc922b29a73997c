// Actual-rate derivation from accumulating readings (e.g. Wh -> W)
use crate::domain::generators::{SeriesError, SeriesGenerator};
use crate::domain::register::{RegisterValue, TimeRegisterValue};

/// `output[i] = (input[i] - input[i-1]) / elapsed hours`, expressed in the
/// fixed rate unit for the input unit (WattHour -> Watt, CubicMetre ->
/// CubicMetrePrHour; anything else gets the Unknown sentinel unit). The
/// first value and device transitions yield a zero rate.
#[derive(Debug, Default)]
pub struct AverageActualGenerator {
    previous: Option<TimeRegisterValue>,
    generated: Vec<TimeRegisterValue>,
}

impl AverageActualGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeriesGenerator for AverageActualGenerator {
    fn calculate_next(&mut self, value: &TimeRegisterValue) -> Result<(), SeriesError> {
        let rate_unit = value.unit().actual_rate();
        let rate = match &self.previous {
            Some(previous) if previous.device_id() == value.device_id() => {
                let elapsed_hours =
                    (value.timestamp() - previous.timestamp()).num_milliseconds() as f64
                        / 3_600_000.0;
                if elapsed_hours > 0.0 {
                    let consumed = value.value().subtract(previous.value()).as_f64();
                    RegisterValue::from_f64(consumed / elapsed_hours, rate_unit)
                } else {
                    RegisterValue::from_f64(0.0, rate_unit)
                }
            }
            _ => RegisterValue::from_f64(0.0, rate_unit),
        };
        self.generated.push(TimeRegisterValue::new(
            value.device_id(),
            value.timestamp(),
            rate,
        ));
        self.previous = Some(value.clone());
        Ok(())
    }

    fn generated(&self) -> &[TimeRegisterValue] {
        &self.generated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::unit::Unit;
    use chrono::{TimeZone, Utc};

    fn reading(device: &str, minute: u32, value: i64, unit: Unit) -> TimeRegisterValue {
        TimeRegisterValue::new(
            device,
            Utc.with_ymd_and_hms(2026, 5, 1, 6, 0, 0).unwrap()
                + chrono::Duration::minutes(minute as i64),
            RegisterValue::new(value, 0, unit),
        )
    }

    #[test]
    fn test_watt_hours_become_watts() {
        let mut generator = AverageActualGenerator::new();
        generator
            .calculate_next(&reading("m1", 0, 1000, Unit::WattHour))
            .unwrap();
        generator
            .calculate_next(&reading("m1", 30, 1250, Unit::WattHour))
            .unwrap();
        let generated = generator.generated();
        assert_eq!(generated[0].value().as_f64(), 0.0);
        // 250 Wh over half an hour is a 500 W average.
        assert_eq!(generated[1].value().as_f64(), 500.0);
        assert_eq!(generated[1].unit(), Unit::Watt);
    }

    #[test]
    fn test_device_change_resets_rate() {
        let mut generator = AverageActualGenerator::new();
        generator
            .calculate_next(&reading("m1", 0, 1000, Unit::WattHour))
            .unwrap();
        generator
            .calculate_next(&reading("m2", 60, 50, Unit::WattHour))
            .unwrap();
        assert_eq!(generator.generated()[1].value().as_f64(), 0.0);
    }

    #[test]
    fn test_unmapped_unit_gets_sentinel() {
        let mut generator = AverageActualGenerator::new();
        generator
            .calculate_next(&reading("m1", 0, 20, Unit::DegreeCentigrade))
            .unwrap();
        generator
            .calculate_next(&reading("m1", 60, 21, Unit::DegreeCentigrade))
            .unwrap();
        assert_eq!(generator.generated()[1].unit(), Unit::Unknown);
    }
}
