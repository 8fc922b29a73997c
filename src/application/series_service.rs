// Query-side series computation: normalization, derived series, configured
// diffs and computed template series over one window
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::application::repositories::ProfileRepository;
use crate::domain::expression::TemplateExpression;
use crate::domain::generators::{
    AverageActualGenerator, DeltaGenerator, DiffByTimeGenerator, PeriodGenerator, SeriesGenerator,
};
use crate::domain::normalize::ResolutionDivider;
use crate::domain::obis::ObisCode;
use crate::domain::register::{NormalizedTimeRegisterValue, TimeRegisterValue};
use crate::domain::series::{LabelSeries, LabelSeriesSet};

/// A configured synthetic series: the template is evaluated against the
/// enriched set and the result appears as a new label carrying `register`.
#[derive(Debug, Clone)]
pub struct ComputedSeriesDef {
    pub label: String,
    pub register: ObisCode,
    pub expression: TemplateExpression,
}

/// A configured per-label cross-register difference, attached under the
/// minuend's diff register.
#[derive(Debug, Clone, Copy)]
pub struct DiffSeriesDef {
    pub minuend: ObisCode,
    pub subtrahend: ObisCode,
}

/// Produces the full normalized series set for a query window: the raw
/// per-label series, the derived delta/period/average series for every
/// cumulative register, the configured diff series, and finally the
/// computed template series whose operands are all present.
pub struct SeriesComputeService {
    profile_repository: Arc<dyn ProfileRepository>,
    computed_series: Vec<ComputedSeriesDef>,
    diff_series: Vec<DiffSeriesDef>,
}

impl SeriesComputeService {
    pub fn new(
        profile_repository: Arc<dyn ProfileRepository>,
        computed_series: Vec<ComputedSeriesDef>,
        diff_series: Vec<DiffSeriesDef>,
    ) -> Self {
        Self {
            profile_repository,
            computed_series,
            diff_series,
        }
    }

    pub async fn compute(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        divider: &ResolutionDivider,
    ) -> anyhow::Result<LabelSeriesSet<NormalizedTimeRegisterValue>> {
        // Reach one slot back so the first in-window delta has a baseline.
        let pre_start = divider.apply(divider.apply(start) - Duration::seconds(1));
        let raw = self
            .profile_repository
            .get_series_set(pre_start, start, end)
            .await?;

        let mut enriched = Vec::with_capacity(raw.series().len());
        for series in raw.series() {
            enriched.push(self.enrich(series, start, divider)?);
        }
        let mut set = LabelSeriesSet::new(start, end, enriched);

        for extra in self.computed(&set, start)? {
            set = set.with_series(extra);
        }
        Ok(set)
    }

    /// Normalize one label's series and attach the derived and diff
    /// registers.
    fn enrich(
        &self,
        series: &LabelSeries<TimeRegisterValue>,
        start: DateTime<Utc>,
        divider: &ResolutionDivider,
    ) -> anyhow::Result<LabelSeries<NormalizedTimeRegisterValue>> {
        let mut enriched = series.normalize(divider);

        let cumulative: Vec<(ObisCode, Vec<TimeRegisterValue>)> = series
            .registers()
            .filter(|(_, values)| {
                values
                    .first()
                    .is_some_and(|value| value.unit().is_cumulative())
            })
            .map(|(obis, values)| (obis, values.to_vec()))
            .collect();

        for (obis, values) in cumulative {
            let mut delta = DeltaGenerator::new();
            let mut period = PeriodGenerator::new();
            let mut average = AverageActualGenerator::new();
            for value in &values {
                delta.calculate_next(value)?;
                period.calculate_next(value)?;
                average.calculate_next(value)?;
            }
            enriched.insert(obis.as_delta(), Self::in_window(&delta, start, divider));
            enriched.insert(obis.as_period(), Self::in_window(&period, start, divider));
            enriched.insert(obis.as_average(), Self::in_window(&average, start, divider));
        }

        for diff in &self.diff_series {
            let mut merged: Vec<(ObisCode, NormalizedTimeRegisterValue)> = enriched
                .values(diff.minuend)
                .iter()
                .map(|value| (diff.minuend, value.clone()))
                .chain(
                    enriched
                        .values(diff.subtrahend)
                        .iter()
                        .map(|value| (diff.subtrahend, value.clone())),
                )
                .collect();
            if merged.is_empty() {
                continue;
            }
            merged.sort_by_key(|(_, value)| value.timestamp());
            let mut generator = DiffByTimeGenerator::new(diff.minuend, diff.subtrahend);
            for (obis, value) in &merged {
                generator.calculate_next(*obis, value);
            }
            let generated: Vec<NormalizedTimeRegisterValue> = generator
                .generated()
                .iter()
                .filter(|value| value.timestamp() >= start)
                .cloned()
                .collect();
            if !generated.is_empty() {
                enriched.insert(diff.minuend.as_diff(), generated);
            }
        }

        Ok(enriched)
    }

    /// Normalize a generator's output and drop the pre-window baseline
    /// entries.
    fn in_window(
        generator: &dyn SeriesGenerator,
        start: DateTime<Utc>,
        divider: &ResolutionDivider,
    ) -> Vec<NormalizedTimeRegisterValue> {
        generator
            .generated()
            .iter()
            .filter(|value| value.timestamp() >= start)
            .map(|value| value.normalize(divider))
            .collect()
    }

    /// Evaluate each satisfied computed-series definition against the
    /// enriched set; definitions with absent operands are skipped, not
    /// errors.
    fn computed(
        &self,
        set: &LabelSeriesSet<NormalizedTimeRegisterValue>,
        start: DateTime<Utc>,
    ) -> anyhow::Result<Vec<LabelSeries<NormalizedTimeRegisterValue>>> {
        let available = set.labels_and_registers();
        let mut extra = Vec::new();
        for def in &self.computed_series {
            if !def.expression.is_satisfied(&available) {
                tracing::debug!(
                    "computed series '{}' skipped, not all operands present",
                    def.label
                );
                continue;
            }
            let values: Vec<NormalizedTimeRegisterValue> = def
                .expression
                .value_expression_set(set)
                .evaluate()
                .into_iter()
                .filter(|value| value.timestamp() >= start)
                .collect();
            if values.is_empty() {
                continue;
            }
            let mut series = LabelSeries::new(def.label.clone(), HashMap::new())?;
            series.insert(def.register, values);
            extra.push(series);
        }
        Ok(extra)
    }
}
