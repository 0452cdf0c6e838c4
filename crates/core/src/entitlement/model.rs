//! Entitlement model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementKey {
    BasicRemoteBoost,
    SmartHomeIntegration,
}

impl EntitlementKey {
    /// Value used when neither a device- nor a tenant-scoped row exists.
    pub fn default_enabled(self) -> bool {
        matches!(self, Self::BasicRemoteBoost)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementScope {
    Tenant,
    Device,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub scope: EntitlementScope,
    /// Populated iff scope is DEVICE.
    pub device_id: Option<Uuid>,
    pub key: EntitlementKey,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementUpsert {
    pub scope: EntitlementScope,
    pub device_id: Option<Uuid>,
    pub key: EntitlementKey,
    pub enabled: bool,
}
