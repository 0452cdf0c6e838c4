//! Audit log listing

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};

use crate::audit::{AuditListQuery, AuditListResponse};
use crate::auth::{require_role, tenant_context, user_session_from_headers, Role};
use crate::error::ApiResult;
use crate::state::AppState;

async fn list_audit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(mut query): Query<AuditListQuery>,
) -> ApiResult<Json<AuditListResponse>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin])?;

    // non-platform callers are pinned to their own tenant; platform admins
    // may browse globally or filter by any tenant
    if !ctx.platform_admin {
        query.tenant_id = Some(ctx.require_tenant()?);
    } else {
        query.tenant_id = ctx.tenant_id;
    }

    let (items, has_more) = state.audit_store().list_paginated(&query).await;
    Ok(Json(AuditListResponse { items, has_more }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/audit", get(list_audit))
}
