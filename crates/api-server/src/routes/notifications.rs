//! Notification channel management and outbound history

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};

use hf_core::notify::{NewNotificationChannel, NotificationChannel, NotificationEvent};

use crate::auth::{require_role, tenant_context, user_session_from_headers, Role};
use crate::error::{map_core_error, ApiResult};
use crate::state::AppState;

use super::TenantQuery;

async fn create_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
    Json(req): Json<NewNotificationChannel>,
) -> ApiResult<(StatusCode, Json<NotificationChannel>)> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin])?;
    let tenant_id = ctx.require_tenant()?;

    let channel = state
        .notify_store()
        .create_channel(tenant_id, req)
        .await
        .map_err(map_core_error)?;
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn list_channels(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<Vec<NotificationChannel>>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_id = ctx.require_tenant()?;
    Ok(Json(state.notify_store().list_channels(tenant_id).await))
}

async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<Vec<NotificationEvent>>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_id = ctx.require_tenant()?;
    Ok(Json(state.notify_store().list_events(tenant_id).await))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/notifications/channels",
            get(list_channels).post(create_channel),
        )
        .route("/api/notifications", get(list_events))
}
