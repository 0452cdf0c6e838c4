//! Entitlement management

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, put},
    Json, Router,
};

use hf_core::entitlement::{Entitlement, EntitlementUpsert};

use crate::auth::{require_role, tenant_context, user_session_from_headers, Role};
use crate::error::{map_core_error, ApiResult};
use crate::state::AppState;

use super::TenantQuery;

async fn upsert_entitlement(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
    Json(req): Json<EntitlementUpsert>,
) -> ApiResult<Json<Entitlement>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin])?;
    let tenant_id = ctx.require_tenant()?;

    let entitlement = state
        .entitlement_store()
        .upsert(tenant_id, req)
        .await
        .map_err(map_core_error)?;
    Ok(Json(entitlement))
}

async fn list_entitlements(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<Vec<Entitlement>>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_id = ctx.require_tenant()?;
    Ok(Json(state.entitlement_store().list(tenant_id).await))
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/entitlements",
        get(list_entitlements).put(upsert_entitlement),
    )
}
