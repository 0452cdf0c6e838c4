//! Route handlers

pub mod alerts;
pub mod audit;
pub mod auth;
pub mod commands;
pub mod dashboard;
pub mod devices;
pub mod entitlements;
pub mod health;
pub mod ingest;
pub mod notifications;
pub mod ota;
pub mod sim;
pub mod sites;
pub mod tenants;
pub mod users;

use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;

/// `tenantId` query value, the lowest-priority tenant source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TenantQuery {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(alerts::router())
        .merge(audit::router())
        .merge(auth::router())
        .merge(commands::router())
        .merge(dashboard::router())
        .merge(devices::router())
        .merge(entitlements::router())
        .merge(health::router())
        .merge(ingest::router())
        .merge(notifications::router())
        .merge(ota::router())
        .merge(sim::router())
        .merge(sites::router())
        .merge(tenants::router())
        .merge(users::router())
}
