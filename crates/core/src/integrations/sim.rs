//! SIM-carrier provider interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimActionKind {
    Activate,
    Suspend,
    Resume,
}

/// Carrier-acknowledged action on a SIM.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimAction {
    pub iccid: String,
    pub action: SimActionKind,
    pub status: String,
    pub requested_at: DateTime<Utc>,
}

#[async_trait]
pub trait SimProvider: Send + Sync {
    async fn execute(&self, iccid: &str, action: SimActionKind) -> Result<SimAction>;
}

/// Stand-in carrier that accepts every action.
pub struct StubSimProvider;

#[async_trait]
impl SimProvider for StubSimProvider {
    async fn execute(&self, iccid: &str, action: SimActionKind) -> Result<SimAction> {
        Ok(SimAction {
            iccid: iccid.to_string(),
            action,
            status: "ACCEPTED".to_string(),
            requested_at: Utc::now(),
        })
    }
}
