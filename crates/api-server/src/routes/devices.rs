//! Device provisioning and fleet queries

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hf_core::fleet::{
    Device, DeviceFilter, DeviceMarker, DeviceTwin, DeviceUpdate, NewDevice,
};

use crate::auth::{
    device_token, require_role, tenant_context, user_session_from_headers, Role,
};
use crate::error::{map_core_error, validation_error, ApiResult};
use crate::state::AppState;

use super::TenantQuery;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCreatedResponse {
    pub device: Device,
    /// `<deviceId>:<hex>` credential the device authenticates with. Shown
    /// once at provisioning.
    pub device_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListResponse {
    pub devices: Vec<Device>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListQuery {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<hf_core::fleet::DeviceStatus>,
    #[serde(default)]
    pub site_id: Option<Uuid>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl DeviceListQuery {
    fn into_filter(self) -> DeviceFilter {
        DeviceFilter {
            status: self.status,
            site_id: self.site_id,
            search: self.search,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRowResult {
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BboxQuery {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    pub bbox: String,
}

async fn create_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
    Json(req): Json<NewDevice>,
) -> ApiResult<(StatusCode, Json<DeviceCreatedResponse>)> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin, Role::Installer])?;
    let tenant_id = ctx.require_tenant()?;

    let (device, token) = provision(&state, tenant_id, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(DeviceCreatedResponse {
            device,
            device_token: token,
        }),
    ))
}

/// Mint the device row together with its pinned MAC digest.
async fn provision(
    state: &AppState,
    tenant_id: Uuid,
    req: NewDevice,
) -> ApiResult<(Device, String)> {
    let secret = &state.config().device_hmac_secret;
    // the digest is derived from the device id, which the store assigns;
    // reserve the id first so the secret row can be written with the device
    let device_id = Uuid::new_v4();
    let token = device_token(device_id, secret);
    let digest = token
        .split_once(':')
        .map(|(_, digest)| digest.to_string())
        .unwrap_or_default();
    let device = state
        .fleet_store()
        .create_device_with_id(device_id, tenant_id, req, digest)
        .await
        .map_err(map_core_error)?;
    Ok((device, token))
}

/// CSV import: header `serialNumber,model,name,siteId`, one device per
/// line. Rows fail independently.
async fn bulk_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
    body: String,
) -> ApiResult<Json<Vec<BulkRowResult>>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin])?;
    let tenant_id = ctx.require_tenant()?;

    if body.trim().is_empty() {
        return Err(validation_error("Missing CSV upload"));
    }

    let mut lines = body.lines().enumerate();
    let (_, header) = lines
        .next()
        .ok_or_else(|| validation_error("Missing CSV header"))?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let serial_idx = columns
        .iter()
        .position(|c| *c == "serialNumber")
        .ok_or_else(|| validation_error("CSV header must include serialNumber"))?;
    let model_idx = columns
        .iter()
        .position(|c| *c == "model")
        .ok_or_else(|| validation_error("CSV header must include model"))?;
    let name_idx = columns.iter().position(|c| *c == "name");
    let site_idx = columns.iter().position(|c| *c == "siteId");

    let mut results = Vec::new();
    for (line_no, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let row = parse_row(&fields, serial_idx, model_idx, name_idx, site_idx);
        let result = match row {
            Err(message) => BulkRowResult {
                line: line_no + 1,
                device_id: None,
                device_token: None,
                error: Some(message),
            },
            Ok(new_device) => match provision(&state, tenant_id, new_device).await {
                Ok((device, token)) => BulkRowResult {
                    line: line_no + 1,
                    device_id: Some(device.id),
                    device_token: Some(token),
                    error: None,
                },
                Err((_, body)) => BulkRowResult {
                    line: line_no + 1,
                    device_id: None,
                    device_token: None,
                    error: Some(body.0.error.message.clone()),
                },
            },
        };
        results.push(result);
    }
    Ok(Json(results))
}

fn parse_row(
    fields: &[&str],
    serial_idx: usize,
    model_idx: usize,
    name_idx: Option<usize>,
    site_idx: Option<usize>,
) -> Result<NewDevice, String> {
    let serial = fields
        .get(serial_idx)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "Missing serialNumber".to_string())?;
    let model = fields
        .get(model_idx)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "Missing model".to_string())?;
    let site_id = match site_idx.and_then(|idx| fields.get(idx)).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => Some(
            Uuid::parse_str(raw).map_err(|_| format!("Invalid siteId '{}'", raw))?,
        ),
    };

    Ok(NewDevice {
        serial_number: serial.to_string(),
        model: model.to_string(),
        name: name_idx
            .and_then(|idx| fields.get(idx))
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string()),
        notes: None,
        site_id,
        owner_user_id: None,
        sim_iccid: None,
        tags: Default::default(),
    })
}

async fn list_devices(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DeviceListQuery>,
) -> ApiResult<Json<DeviceListResponse>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_id = ctx.require_tenant()?;

    let (devices, total) = state
        .fleet_store()
        .list_devices(tenant_id, query.into_filter())
        .await
        .map_err(map_core_error)?;
    Ok(Json(DeviceListResponse { devices, total }))
}

async fn update_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
    Json(req): Json<DeviceUpdate>,
) -> ApiResult<Json<Device>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin, Role::Installer])?;
    let tenant_filter = if ctx.platform_admin {
        ctx.tenant_id
    } else {
        Some(ctx.require_tenant()?)
    };

    let device = state
        .fleet_store()
        .update_device(tenant_filter, device_id, req)
        .await
        .map_err(map_core_error)?;
    Ok(Json(device))
}

async fn get_twin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<DeviceTwin>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_filter = if ctx.platform_admin {
        ctx.tenant_id
    } else {
        Some(ctx.require_tenant()?)
    };

    let twin = state
        .fleet_store()
        .get_twin(tenant_filter, device_id)
        .await
        .map_err(map_core_error)?;
    Ok(Json(twin))
}

/// `bbox=minLon,minLat,maxLon,maxLat`
async fn map_devices(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BboxQuery>,
) -> ApiResult<Json<Vec<DeviceMarker>>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_id = ctx.require_tenant()?;

    let parts: Vec<f64> = query
        .bbox
        .split(',')
        .map(|raw| raw.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| validation_error("bbox must be minLon,minLat,maxLon,maxLat"))?;
    let &[min_lon, min_lat, max_lon, max_lat] = parts.as_slice() else {
        return Err(validation_error("bbox must be minLon,minLat,maxLon,maxLat"));
    };

    let markers = state
        .fleet_store()
        .devices_in_bbox(tenant_id, min_lon, min_lat, max_lon, max_lat)
        .await;
    Ok(Json(markers))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/devices", get(list_devices).post(create_device))
        .route("/api/devices/bulk", post(bulk_create))
        .route("/api/devices/{device_id}", patch(update_device))
        .route("/api/devices/{device_id}/twin", get(get_twin))
        .route("/api/map/devices", get(map_devices))
}
