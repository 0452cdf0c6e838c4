//! User invitation and role management

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{
    require_role, tenant_context, user_session_from_headers, Membership, Role, UserSummary,
};
use crate::error::{map_identity_error, ApiResult};
use crate::state::AppState;

use super::TenantQuery;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    pub user: UserSummary,
    pub membership: Membership,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdateRequest {
    pub role: Role,
}

async fn invite_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<(StatusCode, Json<InviteResponse>)> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin])?;
    let tenant_id = ctx.require_tenant()?;

    let (user, membership) = state
        .identity_store()
        .invite_user(
            tenant_id,
            &req.email,
            &req.name,
            req.role,
            req.password.as_deref(),
        )
        .await
        .map_err(map_identity_error)?;
    Ok((
        StatusCode::CREATED,
        Json(InviteResponse { user, membership }),
    ))
}

async fn update_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
    Json(req): Json<RoleUpdateRequest>,
) -> ApiResult<Json<Membership>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin])?;
    let tenant_id = ctx.require_tenant()?;

    let membership = state
        .identity_store()
        .update_member_role(tenant_id, user_id, req.role)
        .await
        .map_err(map_identity_error)?;
    Ok(Json(membership))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/invite", post(invite_user))
        .route("/api/users/{user_id}/role", patch(update_role))
}
