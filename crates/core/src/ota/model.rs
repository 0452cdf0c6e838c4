//! OTA model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwarePackage {
    pub id: Uuid,
    pub version: String,
    pub download_url: String,
    pub checksum: String,
    pub release_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFirmwarePackage {
    pub version: String,
    pub download_url: String,
    pub checksum: String,
    pub release_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtaTargetType {
    Device,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtaJobStatus {
    Scheduled,
    InProgress,
    Success,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtaJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub target_type: OtaTargetType,
    pub device_id: Option<Uuid>,
    pub group_filter: Option<Value>,
    pub firmware_id: Uuid,
    pub status: OtaJobStatus,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: Value,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOtaJob {
    pub target_type: OtaTargetType,
    pub device_id: Option<Uuid>,
    pub group_filter: Option<Value>,
    pub firmware_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
}

/// Status a device may report for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtaReportStatus {
    InProgress,
    Success,
    Failed,
}
