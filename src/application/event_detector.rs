// Leak detection over normalized cold-water series, with flag-transition
// event creation
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, LocalResult, NaiveTime, TimeZone, Utc};

use crate::application::repositories::{MeterEventRepository, ProfileRepository};
use crate::domain::event::{Amplification, MeterEvent};
use crate::domain::generators::{DeltaGenerator, SeriesGenerator};
use crate::domain::obis::ObisCode;
use crate::domain::register::TimeRegisterValue;

/// Leak-check tuning: the zone-local night window inspected each day and
/// the minimum number of hourly readings required before a verdict.
#[derive(Debug, Clone)]
pub struct LeakCheck {
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
    pub min_intervals: usize,
}

impl Default for LeakCheck {
    fn default() -> Self {
        Self {
            window_start: NaiveTime::MIN,
            window_end: NaiveTime::from_hms_opt(6, 0, 0).expect("06:00 is a valid time"),
            min_intervals: 5,
        }
    }
}

/// Inspects last night's cold-water volume per label and persists a
/// `MeterEvent` whenever a label's leak state changes. Continuous positive
/// flow through the whole night window - when the household should be
/// asleep - is the leak characteristic.
pub struct MeterEventDetector<Tz: TimeZone> {
    time_zone: Tz,
    leak_check: LeakCheck,
    profile_repository: Arc<dyn ProfileRepository>,
    meter_event_repository: Arc<dyn MeterEventRepository>,
}

impl<Tz: TimeZone> MeterEventDetector<Tz> {
    pub fn new(
        time_zone: Tz,
        leak_check: LeakCheck,
        profile_repository: Arc<dyn ProfileRepository>,
        meter_event_repository: Arc<dyn MeterEventRepository>,
    ) -> Self {
        Self {
            time_zone,
            leak_check,
            profile_repository,
            meter_event_repository,
        }
    }

    pub async fn detect(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let Some((start, end)) = self.window(now) else {
            tracing::warn!("could not resolve leak-check window for {}", now);
            return Ok(());
        };
        let series_set = self
            .profile_repository
            .get_series_set(start - Duration::hours(1), start, end)
            .await?;

        let latest_flags: HashMap<String, bool> = self
            .meter_event_repository
            .get_latest_events_by_label()
            .await?
            .into_iter()
            .map(|event| (event.label, event.flag))
            .collect();

        let mut new_events = Vec::new();
        for series in series_set.series() {
            let values = series.values(ObisCode::COLD_WATER_VOLUME);
            if values.is_empty() {
                continue;
            }
            let leak = self.leak_characteristic(values, start, end);
            let previous_flag = latest_flags.get(series.label()).copied().unwrap_or(false);
            let flag = leak.is_some();
            if flag == previous_flag {
                continue;
            }
            let amplification = leak.unwrap_or(Amplification::LeakCharacteristic {
                start,
                end,
                magnitude: 0.0,
                unit: values[0].unit(),
            });
            tracing::info!(
                "leak state for '{}' changed to {}: {:?}",
                series.label(),
                flag,
                amplification
            );
            new_events.push(MeterEvent::new(series.label(), now, flag, amplification));
        }

        if !new_events.is_empty() {
            self.meter_event_repository.add_events(&new_events).await?;
        }
        Ok(())
    }

    /// One reading per hour inside the window; a leak is flagged when at
    /// least `min_intervals` hours are covered and every hourly delta is
    /// positive.
    fn leak_characteristic(
        &self,
        values: &[TimeRegisterValue],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Amplification> {
        let mut hourly: Vec<&TimeRegisterValue> = Vec::new();
        for value in values {
            if value.timestamp() < start || value.timestamp() >= end {
                continue;
            }
            let hour_changed = hourly
                .last()
                .map(|previous| {
                    previous.timestamp().timestamp() / 3600 != value.timestamp().timestamp() / 3600
                })
                .unwrap_or(true);
            if hour_changed {
                hourly.push(value);
            }
        }
        if hourly.len() < self.leak_check.min_intervals {
            return None;
        }

        let mut delta = DeltaGenerator::new();
        for value in &hourly {
            // Delta generation over a single register is infallible.
            delta.calculate_next(value).ok()?;
        }
        let deltas = &delta.generated()[1..];
        if deltas.is_empty() || !deltas.iter().all(|d| d.value().as_f64() > 0.0) {
            return None;
        }
        let magnitude: f64 = deltas.iter().map(|d| d.value().as_f64()).sum();
        Some(Amplification::LeakCharacteristic {
            start,
            end,
            magnitude,
            unit: hourly[0].unit(),
        })
    }

    /// Today's leak-check window in UTC, resolved through the configured
    /// zone. None when a DST transition makes a boundary unrepresentable.
    fn window(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let local_date = now.with_timezone(&self.time_zone).date_naive();
        let start = self.resolve(local_date.and_time(self.leak_check.window_start))?;
        let end = self.resolve(local_date.and_time(self.leak_check.window_end))?;
        (start < end).then_some((start, end))
    }

    fn resolve(&self, local: chrono::NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.time_zone.from_local_datetime(&local) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => None,
        }
    }
}
