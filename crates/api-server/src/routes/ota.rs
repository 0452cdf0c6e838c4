//! Firmware catalog and OTA rollout jobs

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use hf_core::ota::{
    FirmwarePackage, NewFirmwarePackage, NewOtaJob, OtaJob, OtaReportStatus, OtaTargetType,
};

use crate::auth::{
    device_identity_from_headers, require_role, tenant_context, user_session_from_headers, Role,
};
use crate::error::{forbidden, map_core_error, validation_error, ApiResult};
use crate::state::AppState;

use super::TenantQuery;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtaReportRequest {
    pub job_id: Uuid,
    pub status: OtaReportStatus,
    #[serde(default)]
    pub progress: Option<Value>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

async fn register_firmware(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewFirmwarePackage>,
) -> ApiResult<(StatusCode, Json<FirmwarePackage>)> {
    let session = user_session_from_headers(&state, &headers).await?;
    if !session.is_platform_admin() {
        return Err(forbidden("Only platform admins may register firmware"));
    }

    let firmware = state
        .ota_store()
        .create_firmware(req)
        .await
        .map_err(map_core_error)?;
    Ok((StatusCode::CREATED, Json(firmware)))
}

async fn list_firmware(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FirmwarePackage>>> {
    user_session_from_headers(&state, &headers).await?;
    Ok(Json(state.ota_store().list_firmware().await))
}

async fn schedule_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
    Json(req): Json<NewOtaJob>,
) -> ApiResult<(StatusCode, Json<OtaJob>)> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin])?;
    let tenant_id = ctx.require_tenant()?;

    if req.scheduled_at <= Utc::now() {
        return Err(validation_error("scheduledAt must be in the future"));
    }
    if req.target_type == OtaTargetType::Device {
        let device_id = req
            .device_id
            .ok_or_else(|| validation_error("DEVICE target requires a deviceId"))?;
        // the targeted device must live in the active tenant
        state
            .fleet_store()
            .get_device(Some(tenant_id), device_id)
            .await
            .map_err(map_core_error)?;
    }

    let job = state
        .ota_store()
        .schedule_job(tenant_id, req)
        .await
        .map_err(map_core_error)?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<Vec<OtaJob>>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_id = ctx.require_tenant()?;
    Ok(Json(state.ota_store().list_jobs(tenant_id).await))
}

async fn cancel_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<OtaJob>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin])?;
    let tenant_filter = if ctx.platform_admin {
        ctx.tenant_id
    } else {
        Some(ctx.require_tenant()?)
    };

    let job = state
        .ota_store()
        .cancel_job(tenant_filter, job_id)
        .await
        .map_err(map_core_error)?;
    Ok(Json(job))
}

/// Device pull: the earliest live job whose target covers this device.
async fn pending_for_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<Uuid>,
) -> ApiResult<Json<Option<OtaJob>>> {
    let authed_device = device_identity_from_headers(&state, &headers)?;
    if authed_device != device_id {
        return Err(forbidden("Device id in path does not match token"));
    }

    let device = state
        .fleet_store()
        .get_device(None, device_id)
        .await
        .map_err(map_core_error)?;
    let job = state
        .ota_store()
        .pending_for_device(device.tenant_id, device.id)
        .await;
    Ok(Json(job))
}

async fn report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<Uuid>,
    Json(req): Json<OtaReportRequest>,
) -> ApiResult<Json<OtaJob>> {
    let authed_device = device_identity_from_headers(&state, &headers)?;
    if authed_device != device_id {
        return Err(forbidden("Device id in path does not match token"));
    }

    let device = state
        .fleet_store()
        .get_device(None, device_id)
        .await
        .map_err(map_core_error)?;
    let job = state
        .ota_store()
        .report(device.tenant_id, req.job_id, req.status, req.progress, req.error_msg)
        .await
        .map_err(map_core_error)?;

    if req.status == OtaReportStatus::Success {
        let firmware = state
            .ota_store()
            .get_firmware(job.firmware_id)
            .await
            .map_err(map_core_error)?;
        state
            .fleet_store()
            .set_firmware_version(device.id, &firmware.version)
            .await
            .map_err(map_core_error)?;
    }

    Ok(Json(job))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ota/firmware", get(list_firmware).post(register_firmware))
        .route("/api/ota/jobs", get(list_jobs).post(schedule_job))
        .route("/api/ota/jobs/{job_id}/cancel", post(cancel_job))
        .route("/api/ota/devices/{device_id}/ota/pending", get(pending_for_device))
        .route("/api/ota/devices/{device_id}/ota/report", post(report))
}
