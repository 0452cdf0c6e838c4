//! Alert model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Closed,
}

/// Rule predicate, a closed set. Parameters are optional on the wire;
/// evaluation falls back to the deployment defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuleSpec {
    #[serde(rename = "NO_TELEMETRY", rename_all = "camelCase")]
    NoTelemetry { threshold_minutes: Option<i64> },
    #[serde(rename = "OVER_TEMP", rename_all = "camelCase")]
    OverTemp { threshold_c: Option<f64> },
    #[serde(rename = "POSSIBLE_LEAK", rename_all = "camelCase")]
    PossibleLeak { lookback_minutes: Option<i64> },
    #[serde(rename = "SENSOR_OUT_OF_RANGE", rename_all = "camelCase")]
    SensorOutOfRange {
        metric: Option<String>,
        min: Option<f64>,
        max: Option<f64>,
        repeat_count: Option<usize>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub enabled: bool,
    #[serde(flatten)]
    pub spec: RuleSpec,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlertRule {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub spec: RuleSpec,
    pub severity: Severity,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub device_id: Uuid,
    pub rule_id: Uuid,
    pub severity: Severity,
    pub status: AlertStatus,
    /// Unique over non-null values; cleared when the event closes so a
    /// later sweep can re-open the same (device, rule) pair.
    pub dedupe_key: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Value,
}

/// The per-(device, rule) deduplication key.
pub fn dedupe_key(device_id: Uuid, rule_id: Uuid) -> String {
    format!("{}:{}", device_id, rule_id)
}

/// Filters for listing alert events.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEventFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    pub device_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
