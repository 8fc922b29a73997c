// Label-grouped register series and the per-query series set
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::ConfigurationError;
use crate::domain::normalize::ResolutionDivider;
use crate::domain::obis::ObisCode;
use crate::domain::register::{NormalizedTimeRegisterValue, TimeRegisterValue};

/// Ordering key for series entries. Within one register's sequence entries
/// are time-ordered and no two entries share a timestamp for the same
/// device.
pub trait Timestamped {
    fn order_key(&self) -> DateTime<Utc>;
    fn device_key(&self) -> &str;
}

impl Timestamped for TimeRegisterValue {
    fn order_key(&self) -> DateTime<Utc> {
        self.timestamp()
    }

    fn device_key(&self) -> &str {
        self.device_id()
    }
}

impl Timestamped for NormalizedTimeRegisterValue {
    fn order_key(&self) -> DateTime<Utc> {
        self.timestamp()
    }

    fn device_key(&self) -> &str {
        self.device_id()
    }
}

/// A label (device/location name) with one ordered value sequence per
/// register observed under that label.
#[derive(Debug, Clone)]
pub struct LabelSeries<T> {
    label: String,
    registers: HashMap<ObisCode, Vec<T>>,
}

impl<T: Timestamped> LabelSeries<T> {
    pub fn new(
        label: impl Into<String>,
        registers: HashMap<ObisCode, Vec<T>>,
    ) -> Result<Self, ConfigurationError> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(ConfigurationError::EmptyLabel);
        }
        let mut series = Self {
            label,
            registers: HashMap::new(),
        };
        for (obis, values) in registers {
            series.insert(obis, values);
        }
        Ok(series)
    }

    /// Sort by timestamp and drop later duplicates for the same
    /// (device, timestamp) pair, maintaining the series invariant.
    pub fn insert(&mut self, obis: ObisCode, mut values: Vec<T>) {
        values.sort_by(|a, b| {
            a.order_key()
                .cmp(&b.order_key())
                .then_with(|| a.device_key().cmp(b.device_key()))
        });
        values.dedup_by(|b, a| a.order_key() == b.order_key() && a.device_key() == b.device_key());
        self.registers.insert(obis, values);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn contains(&self, obis: ObisCode) -> bool {
        self.registers.contains_key(&obis)
    }

    pub fn values(&self, obis: ObisCode) -> &[T] {
        self.registers.get(&obis).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn registers(&self) -> impl Iterator<Item = (ObisCode, &[T])> {
        self.registers.iter().map(|(obis, v)| (*obis, v.as_slice()))
    }
}

impl LabelSeries<TimeRegisterValue> {
    pub fn normalize(&self, divider: &ResolutionDivider) -> LabelSeries<NormalizedTimeRegisterValue> {
        let registers = self
            .registers
            .iter()
            .map(|(obis, values)| (*obis, values.iter().map(|v| v.normalize(divider)).collect()))
            .collect();
        LabelSeries {
            label: self.label.clone(),
            registers,
        }
    }
}

/// An immutable `[start, end)` query window with one `LabelSeries` per
/// distinct label observed. Built fresh per query, never mutated in place;
/// enrichment (normalization, synthetic series) produces a new set.
#[derive(Debug, Clone)]
pub struct LabelSeriesSet<T> {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    series: Vec<LabelSeries<T>>,
}

impl<T: Timestamped> LabelSeriesSet<T> {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, series: Vec<LabelSeries<T>>) -> Self {
        Self { start, end, series }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn series(&self) -> &[LabelSeries<T>] {
        &self.series
    }

    /// Label lookup is case-insensitive; labels are human-assigned names.
    pub fn series_for(&self, label: &str) -> Option<&LabelSeries<T>> {
        self.series
            .iter()
            .find(|s| s.label().eq_ignore_ascii_case(label))
    }

    /// The (label, registers) map the template satisfaction check runs
    /// against before evaluation is attempted.
    pub fn labels_and_registers(&self) -> HashMap<&str, Vec<ObisCode>> {
        self.series
            .iter()
            .map(|s| (s.label(), s.registers().map(|(obis, _)| obis).collect()))
            .collect()
    }

    pub fn with_series(&self, extra: LabelSeries<T>) -> Self
    where
        T: Clone,
    {
        let mut series = self.series.clone();
        series.push(extra);
        Self {
            start: self.start,
            end: self.end,
            series,
        }
    }
}

impl LabelSeriesSet<TimeRegisterValue> {
    pub fn normalize(&self, divider: &ResolutionDivider) -> LabelSeriesSet<NormalizedTimeRegisterValue> {
        LabelSeriesSet {
            start: self.start,
            end: self.end,
            series: self.series.iter().map(|s| s.normalize(divider)).collect(),
        }
    }
}
