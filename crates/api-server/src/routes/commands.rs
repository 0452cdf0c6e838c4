//! Command queue: user create, device poll and acknowledge

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use hf_core::command::{Command, CommandAckStatus, CommandType};
use hf_core::entitlement::EntitlementKey;

use crate::audit::{ActorType, AuditRecord};
use crate::auth::{
    device_identity_from_headers, require_role, tenant_context, user_session_from_headers, Role,
};
use crate::error::{feature_disabled, forbidden, map_core_error, ApiResult};
use crate::state::AppState;

use super::TenantQuery;

const AUDIT_COMMAND_CREATED: &str = "COMMAND_CREATED";
const AUDIT_COMMAND_ACKED: &str = "COMMAND_ACKED";
const AUDIT_COMMAND_FAILED: &str = "COMMAND_FAILED";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommandRequest {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckRequest {
    pub status: CommandAckStatus,
    pub error_msg: Option<String>,
}

async fn create_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
    Json(req): Json<CreateCommandRequest>,
) -> ApiResult<(StatusCode, Json<Command>)> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(
        &ctx,
        &[
            Role::PlatformAdmin,
            Role::TenantAdmin,
            Role::Installer,
            Role::SupportAgent,
            Role::EndUser,
        ],
    )?;
    let tenant_id = ctx.require_tenant()?;

    // tenant isolation: a foreign device is indistinguishable from a
    // missing one
    let device = state
        .fleet_store()
        .get_device(Some(tenant_id), device_id)
        .await
        .map_err(map_core_error)?;

    let enabled = state
        .entitlement_store()
        .resolve(tenant_id, EntitlementKey::BasicRemoteBoost, Some(device.id))
        .await;
    if !enabled {
        return Err(feature_disabled("Remote boost is disabled for this device"));
    }

    let command = state
        .command_store()
        .create(
            tenant_id,
            device.id,
            req.command_type,
            req.payload,
            session.user.id,
        )
        .await
        .map_err(map_core_error)?;

    state
        .audit_store()
        .record(AuditRecord::new(
            Some(tenant_id),
            Some(session.user.id),
            ActorType::User,
            AUDIT_COMMAND_CREATED,
            "command",
            command.id.to_string(),
            json!({ "deviceId": device.id, "type": command.command_type }),
        ))
        .await;

    Ok((StatusCode::CREATED, Json(command)))
}

/// Device poll. Matching rows are flipped to DELIVERED before they are
/// returned, so a retry never sees them again.
async fn poll_pending(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Command>>> {
    let authed_device = device_identity_from_headers(&state, &headers)?;
    if authed_device != device_id {
        return Err(forbidden("Device id in path does not match token"));
    }

    let delivered = state
        .command_store()
        .poll_pending(device_id)
        .await
        .map_err(map_core_error)?;
    Ok(Json(delivered))
}

async fn acknowledge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((device_id, command_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AckRequest>,
) -> ApiResult<Json<Command>> {
    let authed_device = device_identity_from_headers(&state, &headers)?;
    if authed_device != device_id {
        return Err(forbidden("Device id in path does not match token"));
    }

    let command = state
        .command_store()
        .acknowledge(device_id, command_id, req.status, req.error_msg)
        .await
        .map_err(map_core_error)?;

    let action = match req.status {
        CommandAckStatus::Acked => AUDIT_COMMAND_ACKED,
        CommandAckStatus::Failed => AUDIT_COMMAND_FAILED,
    };
    state
        .audit_store()
        .record(AuditRecord::new(
            Some(command.tenant_id),
            None,
            ActorType::Device,
            action,
            "command",
            command.id.to_string(),
            json!({ "deviceId": device_id }),
        ))
        .await;

    Ok(Json(command))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/devices/{device_id}/commands", post(create_command))
        .route(
            "/api/devices/{device_id}/commands/pending",
            get(poll_pending),
        )
        .route(
            "/api/devices/{device_id}/commands/{command_id}/ack",
            post(acknowledge),
        )
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use hf_core::entitlement::{EntitlementScope, EntitlementUpsert};

    use crate::state::test_support::build_state;
    use crate::testutil::{create_tenant, provision_device, register_user};

    #[tokio::test]
    async fn full_lifecycle_create_poll_ack() {
        let (state, _temp_dir) = build_state().await;
        let admin_token = register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let (device, device_token) = provision_device(&state, tenant.id, "SN-1", None).await;
        let app = super::router().with_state(state);

        let created = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/devices/{}/commands", device.id))
                    .header("Authorization", format!("Bearer {}", admin_token))
                    .header("x-tenant-id", tenant.id.to_string())
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        json!({"type": "REMOTE_BOOST_SET", "payload": {"on": true}})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let body = to_bytes(created.into_body(), usize::MAX).await.unwrap();
        let command: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(command["status"], "QUEUED");
        let command_id = command["id"].as_str().unwrap().to_string();

        let polled = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/devices/{}/commands/pending", device.id))
                    .header("Authorization", format!("Bearer {}", device_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(polled.status(), StatusCode::OK);
        let body = to_bytes(polled.into_body(), usize::MAX).await.unwrap();
        let delivered: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(delivered.as_array().unwrap().len(), 1);
        assert_eq!(delivered[0]["status"], "DELIVERED");

        // a second poll never resurfaces the row
        let again = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/devices/{}/commands/pending", device.id))
                    .header("Authorization", format!("Bearer {}", device_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = to_bytes(again.into_body(), usize::MAX).await.unwrap();
        let empty: Value = serde_json::from_slice(&body).unwrap();
        assert!(empty.as_array().unwrap().is_empty());

        let acked = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!(
                        "/api/devices/{}/commands/{}/ack",
                        device.id, command_id
                    ))
                    .header("Authorization", format!("Bearer {}", device_token))
                    .header("Content-Type", "application/json")
                    .body(Body::from(json!({"status": "ACKED"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(acked.status(), StatusCode::OK);
        let body = to_bytes(acked.into_body(), usize::MAX).await.unwrap();
        let command: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(command["status"], "ACKED");
        assert!(command["ackAt"].as_str().is_some());
    }

    #[tokio::test]
    async fn disabled_entitlement_gates_creation() {
        let (state, _temp_dir) = build_state().await;
        let admin_token = register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let (device, _) = provision_device(&state, tenant.id, "SN-1", None).await;
        state
            .entitlement_store()
            .upsert(
                tenant.id,
                EntitlementUpsert {
                    scope: EntitlementScope::Tenant,
                    device_id: None,
                    key: hf_core::entitlement::EntitlementKey::BasicRemoteBoost,
                    enabled: false,
                },
            )
            .await
            .unwrap();
        let app = super::router().with_state(state);

        let denied = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/devices/{}/commands", device.id))
                    .header("Authorization", format!("Bearer {}", admin_token))
                    .header("x-tenant-id", tenant.id.to_string())
                    .header("Content-Type", "application/json")
                    .body(Body::from(json!({"type": "REMOTE_BOOST_SET"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
        let body = to_bytes(denied.into_body(), usize::MAX).await.unwrap();
        let payload: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["error"]["code"], "FEATURE_DISABLED");
    }

    #[tokio::test]
    async fn wrong_device_identity_is_forbidden() {
        let (state, _temp_dir) = build_state().await;
        register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let (_, token_one) = provision_device(&state, tenant.id, "SN-1", None).await;
        let (device_two, _) = provision_device(&state, tenant.id, "SN-2", None).await;
        let app = super::router().with_state(state);

        let denied = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/devices/{}/commands/pending", device_two.id))
                    .header("Authorization", format!("Bearer {}", token_one))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn foreign_tenant_device_is_not_found() {
        let (state, _temp_dir) = build_state().await;
        let admin_token = register_user(&state, "root@example.com").await;
        let tenant_a = create_tenant(&state, "Tenant A").await;
        let tenant_b = create_tenant(&state, "Tenant B").await;
        let (device_a, _) = provision_device(&state, tenant_a.id, "SN-A", None).await;
        let app = super::router().with_state(state);

        // even the platform admin, acting in tenant B, cannot address A's device
        let missing = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/devices/{}/commands", device_a.id))
                    .header("Authorization", format!("Bearer {}", admin_token))
                    .header("x-tenant-id", tenant_b.id.to_string())
                    .header("Content-Type", "application/json")
                    .body(Body::from(json!({"type": "SET_CONFIG"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
