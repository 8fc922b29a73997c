// Engine configuration: TOML-backed, validated into domain types
use std::str::FromStr;

use anyhow::Context;
use chrono::{Duration, NaiveTime};
use serde::Deserialize;

use crate::application::event_detector::LeakCheck;
use crate::application::readings_piper::PipeSchedule;
use crate::application::series_service::{ComputedSeriesDef, DiffSeriesDef};
use crate::domain::expression::TemplateExpression;
use crate::domain::normalize::ResolutionDivider;
use crate::domain::obis::ObisCode;

/// Raw deserialized configuration. Registers, templates and the resolution
/// spec stay strings here; the conversion methods below validate them into
/// domain types so a bad config fails at startup, not mid-pipeline. Unknown
/// keys are rejected, so a key placed under the wrong TOML table fails the
/// load instead of silently leaving a default in place.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// IANA zone name; resolved to a concrete `TimeZone` by the embedder.
    pub time_zone: String,
    pub resolution: String,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub leak_check: LeakCheckConfig,
    /// Zone-local minutes past midnight for the daily detect-and-notify run.
    #[serde(default = "default_detect_minutes")]
    pub detect_minutes: i64,
    #[serde(default)]
    pub computed_series: Vec<ComputedSeriesConfig>,
    #[serde(default)]
    pub diff_series: Vec<DiffSeriesConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    #[serde(default = "default_live_pipe_minutes")]
    pub live_pipe_minutes: i64,
    #[serde(default = "default_day_pipe_minutes")]
    pub day_pipe_minutes: i64,
    #[serde(default = "default_month_pipe_minutes")]
    pub month_pipe_minutes: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LeakCheckConfig {
    #[serde(default = "default_window_start")]
    pub window_start: NaiveTime,
    #[serde(default = "default_window_end")]
    pub window_end: NaiveTime,
    #[serde(default = "default_min_intervals")]
    pub min_intervals: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ComputedSeriesConfig {
    pub label: String,
    pub register: String,
    pub template: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DiffSeriesConfig {
    pub minuend: String,
    pub subtrahend: String,
}

fn default_detect_minutes() -> i64 {
    420
}

fn default_live_pipe_minutes() -> i64 {
    45
}

fn default_day_pipe_minutes() -> i64 {
    50
}

fn default_month_pipe_minutes() -> i64 {
    55
}

fn default_window_start() -> NaiveTime {
    NaiveTime::MIN
}

fn default_window_end() -> NaiveTime {
    NaiveTime::from_hms_opt(6, 0, 0).expect("06:00 is a valid time")
}

fn default_min_intervals() -> usize {
    5
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            live_pipe_minutes: default_live_pipe_minutes(),
            day_pipe_minutes: default_day_pipe_minutes(),
            month_pipe_minutes: default_month_pipe_minutes(),
        }
    }
}

impl Default for LeakCheckConfig {
    fn default() -> Self {
        Self {
            window_start: default_window_start(),
            window_end: default_window_end(),
            min_intervals: default_min_intervals(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn resolution_divider(&self) -> anyhow::Result<ResolutionDivider> {
        ResolutionDivider::new(&self.resolution)
            .with_context(|| format!("invalid resolution '{}'", self.resolution))
    }

    pub fn pipe_schedule(&self) -> PipeSchedule {
        PipeSchedule {
            live_pipe_time: Duration::minutes(self.schedule.live_pipe_minutes),
            day_pipe_time: Duration::minutes(self.schedule.day_pipe_minutes),
            month_pipe_time: Duration::minutes(self.schedule.month_pipe_minutes),
        }
    }

    pub fn leak_check(&self) -> LeakCheck {
        LeakCheck {
            window_start: self.leak_check.window_start,
            window_end: self.leak_check.window_end,
            min_intervals: self.leak_check.min_intervals,
        }
    }

    pub fn detect_time(&self) -> Duration {
        Duration::minutes(self.detect_minutes)
    }

    pub fn computed_series(&self) -> anyhow::Result<Vec<ComputedSeriesDef>> {
        self.computed_series
            .iter()
            .map(|entry| {
                let register = ObisCode::from_str(&entry.register)
                    .with_context(|| format!("computed series '{}': bad register", entry.label))?;
                let expression = TemplateExpression::parse(&entry.template)
                    .with_context(|| format!("computed series '{}': bad template", entry.label))?;
                Ok(ComputedSeriesDef {
                    label: entry.label.clone(),
                    register,
                    expression,
                })
            })
            .collect()
    }

    pub fn diff_series(&self) -> anyhow::Result<Vec<DiffSeriesDef>> {
        self.diff_series
            .iter()
            .map(|entry| {
                let minuend = ObisCode::from_str(&entry.minuend)
                    .with_context(|| format!("diff series: bad minuend '{}'", entry.minuend))?;
                let subtrahend = ObisCode::from_str(&entry.subtrahend).with_context(|| {
                    format!("diff series: bad subtrahend '{}'", entry.subtrahend)
                })?;
                Ok(DiffSeriesDef {
                    minuend,
                    subtrahend,
                })
            })
            .collect()
    }
}

pub fn load_engine_config() -> anyhow::Result<EngineConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/engine"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
