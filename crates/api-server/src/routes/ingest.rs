//! Telemetry ingestion (device-authenticated)

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use hf_core::fleet::IngestReading;

use crate::audit::{ActorType, AuditRecord};
use crate::auth::device_identity_from_headers;
use crate::error::{map_core_error, validation_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

async fn ingest_telemetry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(reading): Json<IngestReading>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let device_id = device_identity_from_headers(&state, &headers)?;
    if reading.device_id != device_id {
        return Err(validation_error(
            "Payload deviceId does not match the authenticated device",
        ));
    }

    let outcome = state
        .fleet_store()
        .ingest_telemetry(reading)
        .await
        .map_err(map_core_error)?;

    for pending in &outcome.audits {
        state
            .audit_store()
            .record(AuditRecord::new(
                pending.tenant_id,
                None,
                ActorType::Device,
                pending.action,
                pending.entity_type,
                pending.entity_id.clone(),
                pending.metadata.clone(),
            ))
            .await;
    }

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            id: outcome.telemetry_id,
            warnings: outcome.warnings,
        }),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/ingest/telemetry", post(ingest_telemetry))
}
