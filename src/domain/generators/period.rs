// Running accumulation across device transitions within a period
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::domain::generators::{SeriesError, SeriesGenerator};
use crate::domain::register::{RegisterValue, TimeRegisterValue};

/// Running consumption since the start of the sequence, carried smoothly
/// across device swaps: each device's contribution is measured against the
/// first value seen for that device, and every output is the sum of all
/// per-transition contributions so far. A replaced meter therefore shows no
/// visible discontinuity in the accumulated series.
#[derive(Debug, Default)]
pub struct PeriodGenerator {
    references: HashMap<String, TimeRegisterValue>,
    transition_deltas: BTreeMap<(String, DateTime<Utc>), RegisterValue>,
    generated: Vec<TimeRegisterValue>,
}

impl PeriodGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn sum_transitions(&self) -> Result<Option<RegisterValue>, SeriesError> {
        let mut total: Option<RegisterValue> = None;
        for delta in self.transition_deltas.values() {
            total = Some(match total {
                None => *delta,
                Some(sum) => {
                    if sum.unit() != delta.unit() {
                        return Err(SeriesError::DataMisaligned {
                            left: sum.unit(),
                            right: delta.unit(),
                        });
                    }
                    sum.add(*delta)
                }
            });
        }
        Ok(total)
    }
}

impl SeriesGenerator for PeriodGenerator {
    fn calculate_next(&mut self, value: &TimeRegisterValue) -> Result<(), SeriesError> {
        let reference = self
            .references
            .entry(value.device_id().to_string())
            .or_insert_with(|| value.clone())
            .clone();
        let delta = value.value().subtract(reference.value());
        self.transition_deltas
            .insert((value.device_id().to_string(), reference.timestamp()), delta);
        let total = self
            .sum_transitions()?
            .unwrap_or_else(|| value.value().zero());
        self.generated.push(TimeRegisterValue::new(
            value.device_id(),
            value.timestamp(),
            total,
        ));
        Ok(())
    }

    fn generated(&self) -> &[TimeRegisterValue] {
        &self.generated
    }
}
