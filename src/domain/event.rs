// Meter events - detected anomaly state transitions per label
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::unit::Unit;

/// Event-type-specific payload describing the window and magnitude of a
/// detected anomaly. Serialized to JSON by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Amplification {
    #[serde(rename_all = "camelCase")]
    LeakCharacteristic {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        magnitude: f64,
        unit: Unit,
    },
}

impl Amplification {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// A detected anomaly state for a label. Immutable once created; a state is
/// only ever superseded by a newer event with the opposite flag.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterEvent {
    pub label: String,
    pub detect_timestamp: DateTime<Utc>,
    pub flag: bool,
    pub amplification: Amplification,
}

impl MeterEvent {
    pub fn new(
        label: impl Into<String>,
        detect_timestamp: DateTime<Utc>,
        flag: bool,
        amplification: Amplification,
    ) -> Self {
        Self {
            label: label.into(),
            detect_timestamp,
            flag,
            amplification,
        }
    }
}
