//! SIM-carrier actions

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use hf_core::integrations::{SimAction, SimActionKind};

use crate::audit::{ActorType, AuditRecord};
use crate::auth::{require_role, tenant_context, user_session_from_headers, Role};
use crate::error::{map_core_error, ApiResult};
use crate::state::AppState;

use super::TenantQuery;

const AUDIT_SIM_ACTION: &str = "SIM_ACTION_REQUESTED";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimActionRequest {
    pub action: SimActionKind,
}

async fn execute_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(iccid): Path<String>,
    Query(query): Query<TenantQuery>,
    Json(req): Json<SimActionRequest>,
) -> ApiResult<Json<SimAction>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin])?;

    let action = state
        .sim_provider()
        .execute(&iccid, req.action)
        .await
        .map_err(map_core_error)?;

    state
        .audit_store()
        .record(AuditRecord::new(
            ctx.tenant_id,
            Some(session.user.id),
            ActorType::User,
            AUDIT_SIM_ACTION,
            "sim",
            iccid,
            json!({ "action": req.action, "status": action.status }),
        ))
        .await;

    Ok(Json(action))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/sim/{iccid}/actions", post(execute_action))
}
