// Domain layer - immutable data model and pure computation
pub mod event;
pub mod expression;
pub mod generators;
pub mod normalize;
pub mod obis;
pub mod register;
pub mod series;
pub mod unit;

use thiserror::Error;

pub use event::{Amplification, MeterEvent};
pub use expression::{TemplateExpression, TemplateExpressionError, ValueExpressionSet};
pub use normalize::ResolutionDivider;
pub use obis::ObisCode;
pub use register::{
    CALCULATED_DEVICE_ID, NormalizedTimeRegisterValue, RegisterValue, TimeRegisterValue,
};
pub use series::{LabelSeries, LabelSeriesSet};
pub use unit::Unit;

/// Construction-time configuration and argument contract violations.
/// These fail fast at parse/setup time, never during evaluation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unknown resolution divider spec '{0}'")]
    InvalidResolutionSpec(String),
    #[error("label must not be empty")]
    EmptyLabel,
}
