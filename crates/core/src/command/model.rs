//! Command model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    RemoteBoostSet,
    SetSchedule,
    SetConfig,
}

/// Delivery state. `Expired` is reserved for an out-of-band reaper; no core
/// transition produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Queued,
    Delivered,
    Acked,
    Failed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub device_id: Uuid,
    pub command_type: CommandType,
    pub payload: Value,
    pub requested_by_user_id: Uuid,
    pub status: CommandStatus,
    pub requested_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub ack_at: Option<DateTime<Utc>>,
    pub error_msg: Option<String>,
}

/// Terminal state a device may report for a delivered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandAckStatus {
    Acked,
    Failed,
}
