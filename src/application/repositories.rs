// Collaborator contracts consumed by the engine - storage and outbound
// channels stay behind these traits; the core never talks to a database,
// mail server or broker directly.
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::event::MeterEvent;
use crate::domain::register::TimeRegisterValue;
use crate::domain::series::LabelSeriesSet;

/// A raw reading as ingested, bound to the label it was reported under.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledReading {
    pub label: String,
    pub reading: TimeRegisterValue,
}

/// A notification recipient with a stable identity for position tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Recipient {
    pub name: String,
    pub email_address: String,
}

/// Persists ingested raw readings. Write-only from the pipeline's point of
/// view; the rollup steps read back through `ProfileRepository`.
#[async_trait]
pub trait ReadingRepository: Send + Sync {
    async fn add(&self, readings: &[LabelledReading]) -> anyhow::Result<()>;
}

/// Reads back per-label series for a query window. `pre_start` extends the
/// query backwards so delta-style derivations have a baseline before
/// `start`.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_series_set(
        &self,
        pre_start: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<LabelSeriesSet<TimeRegisterValue>>;
}

/// Rollup persistence. Each call pipes at most one unit of backlog and
/// reports whether it actually piped something, so callers can drain in a
/// bounded loop.
#[async_trait]
pub trait PipeRepository: Send + Sync {
    async fn pipe_live_to_day(&self, now: DateTime<Utc>) -> anyhow::Result<bool>;
    async fn pipe_day_to_month(&self, now: DateTime<Utc>) -> anyhow::Result<bool>;
    async fn pipe_month_to_year(&self, now: DateTime<Utc>) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait MeterEventRepository: Send + Sync {
    /// The most recent persisted event per label, any flag state.
    async fn get_latest_events_by_label(&self) -> anyhow::Result<Vec<MeterEvent>>;
    async fn add_events(&self, events: &[MeterEvent]) -> anyhow::Result<()>;
    /// Highest id among flagged events, or None when nothing is flagged.
    async fn get_max_flagged_event_id(&self) -> anyhow::Result<Option<i64>>;
}

#[async_trait]
pub trait RecipientRepository: Send + Sync {
    async fn get_recipients_with_last_notified_position(
        &self,
    ) -> anyhow::Result<Vec<(Recipient, Option<i64>)>>;
    async fn set_last_notified_position(
        &self,
        recipient: &Recipient,
        event_id: i64,
    ) -> anyhow::Result<()>;
}

/// Outbound notification channel (mail, MQTT). Best-effort: failures are
/// logged by the caller and retried on the next detection round; delivery
/// is not exactly-once.
#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn notify(&self, recipient: &Recipient, newest_event_id: i64) -> anyhow::Result<()>;
}

/// Publishes newly arrived readings to subscribers (e.g. an MQTT topic).
#[async_trait]
pub trait ReadingPublisher: Send + Sync {
    async fn publish(&self) -> anyhow::Result<()>;
}

/// Re-evaluates relay/disconnect control state after new readings.
#[async_trait]
pub trait ControlActuator: Send + Sync {
    async fn actuate(&self) -> anyhow::Result<()>;
}

/// Device/store health probe run once per readings signal.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> anyhow::Result<()>;
}
