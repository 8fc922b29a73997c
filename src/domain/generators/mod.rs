// Series generators - single-pass derivation of chart/billing series
pub mod average_actual;
pub mod delta;
pub mod diff_by_time;
pub mod period;

use thiserror::Error;

use crate::domain::register::TimeRegisterValue;
use crate::domain::unit::Unit;

pub use average_actual::AverageActualGenerator;
pub use delta::DeltaGenerator;
pub use diff_by_time::DiffByTimeGenerator;
pub use period::PeriodGenerator;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeriesError {
    /// A producer-side contract breach: values feeding one running sum
    /// carried different units. Fatal, unlike ordinary data sparsity.
    #[error("misaligned units in series accumulation: {left} vs {right}")]
    DataMisaligned { left: Unit, right: Unit },
}

/// A stateful single-pass derivation over one ordered value sequence.
/// Feed values in input order via `calculate_next`; read the accumulated
/// output, one entry per input, from `generated`.
pub trait SeriesGenerator {
    fn calculate_next(&mut self, value: &TimeRegisterValue) -> Result<(), SeriesError>;
    fn generated(&self) -> &[TimeRegisterValue];
}
