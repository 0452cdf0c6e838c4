//! Fleet model definitions

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Provenance of a coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeoSource {
    MobileGps,
    EdgeGnss,
    EdgeCell,
    Manual,
}

/// Device lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Provisioned,
    Installed,
    Active,
    Suspended,
    Retired,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::Provisioned
    }
}

/// A single telemetry metric value. Metric bags are schemaless; unknown
/// keys are stored untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

/// Plausibility bounds for the well-known numeric metrics. Values outside
/// the bounds are ingested anyway and reported as warnings.
pub const METRIC_RANGES: &[(&str, f64, f64)] = &[
    ("tankTempC", -10.0, 120.0),
    ("ambientTempC", -50.0, 70.0),
    ("humidityPct", 0.0, 100.0),
    ("lux", 0.0, 200_000.0),
    ("flowLpm", 0.0, 50.0),
    ("powerW", 0.0, 10_000.0),
    ("batteryPct", 0.0, 100.0),
    ("rssiDbm", -130.0, 0.0),
];

/// A physical location under a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub location_source: Option<GeoSource>,
    pub location_accuracy_m: Option<f64>,
    pub location_confidence: Option<f64>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub location_updated_by: Option<Uuid>,
    /// When set, device-reported coordinates never overwrite the site.
    pub location_lock: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a user may set when creating a site.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSite {
    pub name: String,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default)]
    pub location_lock: bool,
}

/// User-driven location update for a site.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteLocationUpdate {
    pub lat: f64,
    pub lon: f64,
    pub source: GeoSource,
    pub accuracy_m: Option<f64>,
    pub lock: Option<bool>,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// A managed unit under a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub site_id: Option<Uuid>,
    pub owner_user_id: Option<Uuid>,
    pub serial_number: String,
    pub model: String,
    pub name: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub status: DeviceStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub firmware_version: Option<String>,
    pub sim_iccid: Option<String>,
    pub reported_lat: Option<f64>,
    pub reported_lon: Option<f64>,
    pub reported_geo_source: Option<GeoSource>,
    pub reported_accuracy_m: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when provisioning a device.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub serial_number: String,
    pub model: String,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub site_id: Option<Uuid>,
    pub owner_user_id: Option<Uuid>,
    pub sim_iccid: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Partial update for a device.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub site_id: Option<Uuid>,
    pub owner_user_id: Option<Uuid>,
    pub status: Option<DeviceStatus>,
    pub sim_iccid: Option<String>,
    pub tags: Option<BTreeMap<String, String>>,
}

/// Filters for device listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFilter {
    pub status: Option<DeviceStatus>,
    pub site_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Pins a device identity to the deployment-wide shared secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSecret {
    pub device_id: Uuid,
    pub mac_digest: String,
    pub created_at: DateTime<Utc>,
}

/// Device-reported coordinates attached to a telemetry reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoReading {
    pub lat: f64,
    pub lon: f64,
    pub accuracy_m: Option<f64>,
    pub source: GeoSource,
}

/// A time-point reading for a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub id: Uuid,
    pub device_id: Uuid,
    pub ts: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoReading>,
    pub created_at: DateTime<Utc>,
}

/// Server-side mirror of a device's last reported state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTwin {
    pub device_id: Uuid,
    pub last_ts: Option<DateTime<Utc>>,
    pub derived_state: BTreeMap<String, Value>,
    pub updated_at: DateTime<Utc>,
}

/// Telemetry ingest payload after device authentication.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReading {
    pub device_id: Uuid,
    pub ts: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricValue>,
    #[serde(default)]
    pub geo: Option<GeoReading>,
}

/// Audit record produced inside a fleet mutation, emitted by the caller.
#[derive(Debug, Clone)]
pub struct PendingAudit {
    pub tenant_id: Option<Uuid>,
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: String,
    pub metadata: Value,
}

/// Result of a telemetry ingest.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub telemetry_id: Uuid,
    pub warnings: Vec<String>,
    pub audits: Vec<PendingAudit>,
}

/// Map marker for the device map endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMarker {
    pub device_id: Uuid,
    pub serial_number: String,
    pub name: Option<String>,
    pub status: DeviceStatus,
    pub lat: f64,
    pub lon: f64,
}

/// Validate the well-known numeric metrics against their plausibility
/// bounds. Returns one warning per out-of-range value.
pub fn validate_metrics(metrics: &BTreeMap<String, MetricValue>) -> Vec<String> {
    let mut warnings = Vec::new();
    for (name, min, max) in METRIC_RANGES {
        if let Some(value) = metrics.get(*name).and_then(MetricValue::as_f64) {
            if value < *min || value > *max {
                warnings.push(format!(
                    "{} value {} outside plausible range [{}, {}]",
                    name, value, min, max
                ));
            }
        }
    }
    warnings
}
