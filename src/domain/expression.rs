// Template expression language: `label:obis` operands combined with + and -
use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::obis::ObisCode;
use crate::domain::register::{
    CALCULATED_DEVICE_ID, NormalizedTimeRegisterValue, TimeRegisterValue,
};
use crate::domain::series::LabelSeriesSet;
use crate::domain::unit::Unit;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateExpressionError {
    #[error("unsupported operator '{0}' in template")]
    UnsupportedOperator(char),
    #[error("operand '{0}' must have exactly one ':' separating label and register")]
    MalformedOperand(String),
    #[error("operand '{operand}' has an invalid register identifier: {reason}")]
    InvalidRegister { operand: String, reason: String },
    #[error("template has an empty operand")]
    EmptyOperand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
}

/// Parsed arithmetic template over `label:obis` operands. Parsing scans for
/// the last operator right-to-left, so `A+B-C` becomes `(A+B)-C`:
/// left-associative with equal precedence for both operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateExpression {
    Register {
        label: String,
        obis: ObisCode,
    },
    Operation {
        left: Box<TemplateExpression>,
        operator: Operator,
        right: Box<TemplateExpression>,
    },
}

impl TemplateExpression {
    pub fn parse(template: &str) -> Result<Self, TemplateExpressionError> {
        let stripped: String = template.chars().filter(|c| !c.is_whitespace()).collect();
        Self::parse_part(&stripped)
    }

    fn parse_part(part: &str) -> Result<Self, TemplateExpressionError> {
        if part.is_empty() {
            return Err(TemplateExpressionError::EmptyOperand);
        }
        if let Some(index) = part.rfind(['+', '-', '*', '/']) {
            let operator = match part.as_bytes()[index] {
                b'+' => Operator::Add,
                b'-' => Operator::Subtract,
                other => return Err(TemplateExpressionError::UnsupportedOperator(other as char)),
            };
            let left = Self::parse_part(&part[..index])?;
            let right = Self::parse_leaf(&part[index + 1..])?;
            return Ok(TemplateExpression::Operation {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            });
        }
        Self::parse_leaf(part)
    }

    fn parse_leaf(operand: &str) -> Result<Self, TemplateExpressionError> {
        if operand.is_empty() {
            return Err(TemplateExpressionError::EmptyOperand);
        }
        let mut parts = operand.split(':');
        let (label, register) = match (parts.next(), parts.next(), parts.next()) {
            (Some(label), Some(register), None) if !label.is_empty() => (label, register),
            _ => return Err(TemplateExpressionError::MalformedOperand(operand.to_string())),
        };
        let obis = ObisCode::from_str(register).map_err(|e| {
            TemplateExpressionError::InvalidRegister {
                operand: operand.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(TemplateExpression::Register {
            label: label.to_string(),
            obis,
        })
    }

    /// Whether every referenced (label, register) pair is present in the
    /// given map. Labels compare case-insensitively. Checked before
    /// evaluation so computed-series definitions referencing absent data are
    /// filtered out instead of evaluating to garbage.
    pub fn is_satisfied(&self, labels_and_registers: &HashMap<&str, Vec<ObisCode>>) -> bool {
        match self {
            TemplateExpression::Register { label, obis } => labels_and_registers
                .iter()
                .any(|(l, registers)| l.eq_ignore_ascii_case(label) && registers.contains(obis)),
            TemplateExpression::Operation { left, right, .. } => {
                left.is_satisfied(labels_and_registers) && right.is_satisfied(labels_and_registers)
            }
        }
    }

    /// Bind the expression to a concrete data set, producing a lazy
    /// evaluation plan.
    pub fn value_expression_set(
        &self,
        series_set: &LabelSeriesSet<NormalizedTimeRegisterValue>,
    ) -> ValueExpressionSet {
        match self {
            TemplateExpression::Register { label, obis } => {
                let values = series_set
                    .series_for(label)
                    .map(|series| series.values(*obis).to_vec())
                    .unwrap_or_default();
                ValueExpressionSet::Series(values)
            }
            TemplateExpression::Operation {
                left,
                operator,
                right,
            } => ValueExpressionSet::Combine {
                left: Box::new(left.value_expression_set(series_set)),
                operator: *operator,
                right: Box::new(right.value_expression_set(series_set)),
            },
        }
    }
}

/// A pending evaluation: either a raw leaf series or an Add/Subtract
/// combination of two sub-plans. Evaluation is pure; the same plan over the
/// same data yields the same result.
#[derive(Debug, Clone)]
pub enum ValueExpressionSet {
    Series(Vec<NormalizedTimeRegisterValue>),
    Combine {
        left: Box<ValueExpressionSet>,
        operator: Operator,
        right: Box<ValueExpressionSet>,
    },
}

impl ValueExpressionSet {
    /// Materialize the synthetic series. Operation nodes inner-join their
    /// operands on (normalized timestamp, unit); entries without a partner
    /// are dropped silently, since sparse and heterogeneous device data is
    /// expected. Subtraction is not clamped at zero on this path.
    pub fn evaluate(&self) -> Vec<NormalizedTimeRegisterValue> {
        match self {
            ValueExpressionSet::Series(values) => values.clone(),
            ValueExpressionSet::Combine {
                left,
                operator,
                right,
            } => {
                let left_values = left.evaluate();
                let right_values = right.evaluate();
                let mut by_slot: HashMap<(DateTime<Utc>, Unit), &NormalizedTimeRegisterValue> =
                    HashMap::new();
                for value in &right_values {
                    by_slot
                        .entry((value.normalized_timestamp(), value.unit()))
                        .or_insert(value);
                }
                left_values
                    .iter()
                    .filter_map(|left_value| {
                        let key = (left_value.normalized_timestamp(), left_value.unit());
                        let right_value = by_slot.get(&key)?;
                        Some(combine(left_value, *operator, right_value))
                    })
                    .collect()
            }
        }
    }
}

/// The result keeps the left operand's normalized timestamp (equal to the
/// right's by the join key), carries the calculated-device sentinel, and
/// takes the mean of the operands' raw timestamps - a display-only
/// tie-break; the normalized timestamp is what governs the join.
fn combine(
    left: &NormalizedTimeRegisterValue,
    operator: Operator,
    right: &NormalizedTimeRegisterValue,
) -> NormalizedTimeRegisterValue {
    let value = match operator {
        Operator::Add => left.value().add(right.value()),
        Operator::Subtract => left.value().subtract(right.value()),
    };
    let inner = TimeRegisterValue::new(
        CALCULATED_DEVICE_ID,
        mean_timestamp(left.timestamp(), right.timestamp()),
        value,
    );
    NormalizedTimeRegisterValue::new(inner, left.normalized_timestamp())
}

fn mean_timestamp(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    let (earlier, later) = if a <= b { (a, b) } else { (b, a) };
    earlier + (later - earlier) / 2
}
