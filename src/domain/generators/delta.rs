// Delta between consecutive readings of an accumulating register
use crate::domain::generators::{SeriesError, SeriesGenerator};
use crate::domain::register::TimeRegisterValue;

/// `output[i] = input[i] - input[i-1]` while the device id stays the same.
/// The first value and any device transition yield zero; a swapped meter
/// resets the baseline instead of producing a bogus negative step.
#[derive(Debug, Default)]
pub struct DeltaGenerator {
    previous: Option<TimeRegisterValue>,
    generated: Vec<TimeRegisterValue>,
}

impl DeltaGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeriesGenerator for DeltaGenerator {
    fn calculate_next(&mut self, value: &TimeRegisterValue) -> Result<(), SeriesError> {
        let delta = match &self.previous {
            Some(previous) if previous.device_id() == value.device_id() => {
                value.value().subtract(previous.value())
            }
            _ => value.value().zero(),
        };
        self.generated.push(TimeRegisterValue::new(
            value.device_id(),
            value.timestamp(),
            delta,
        ));
        self.previous = Some(value.clone());
        Ok(())
    }

    fn generated(&self) -> &[TimeRegisterValue] {
        &self.generated
    }
}
