//! Tenant management

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::auth::{user_session_from_headers, Tenant, TenantType};
use crate::error::{forbidden, map_identity_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub tenant_type: TenantType,
}

async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateTenantRequest>,
) -> ApiResult<(StatusCode, Json<Tenant>)> {
    let session = user_session_from_headers(&state, &headers).await?;
    if !session.is_platform_admin() {
        return Err(forbidden("Only platform admins may create tenants"));
    }

    let tenant = state
        .identity_store()
        .create_tenant(&req.name, req.tenant_type)
        .await
        .map_err(map_identity_error)?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

async fn list_tenants(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Tenant>>> {
    let session = user_session_from_headers(&state, &headers).await?;
    Ok(Json(state.identity_store().list_tenants_for(&session).await))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/tenants", get(list_tenants).post(create_tenant))
}
