//! Alert rules and events

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hf_core::alert::{AlertEvent, AlertEventFilter, AlertRule, AlertStatus, NewAlertRule, Severity};

use crate::auth::{require_role, tenant_context, user_session_from_headers, Role};
use crate::error::{map_core_error, ApiResult};
use crate::state::AppState;

use super::TenantQuery;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertListResponse {
    pub events: Vec<AlertEvent>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertListQuery {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<AlertStatus>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub device_id: Option<Uuid>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

async fn create_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
    Json(req): Json<NewAlertRule>,
) -> ApiResult<(StatusCode, Json<AlertRule>)> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin])?;
    let tenant_id = ctx.require_tenant()?;

    let rule = state
        .alert_store()
        .create_rule(tenant_id, req)
        .await
        .map_err(map_core_error)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn list_rules(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<Vec<AlertRule>>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_id = ctx.require_tenant()?;
    Ok(Json(state.alert_store().list_rules(tenant_id).await))
}

async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AlertListQuery>,
) -> ApiResult<Json<AlertListResponse>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_id = ctx.require_tenant()?;

    let filter = AlertEventFilter {
        status: query.status,
        severity: query.severity,
        device_id: query.device_id,
        limit: query.limit,
        offset: query.offset,
    };
    let (events, total) = state.alert_store().list_events(tenant_id, filter).await;
    Ok(Json(AlertListResponse { events, total }))
}

async fn acknowledge_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<AlertEvent>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_filter = if ctx.platform_admin {
        ctx.tenant_id
    } else {
        Some(ctx.require_tenant()?)
    };

    let event = state
        .alert_store()
        .acknowledge_event(tenant_filter, event_id)
        .await
        .map_err(map_core_error)?;
    Ok(Json(event))
}

async fn close_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<AlertEvent>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_filter = if ctx.platform_admin {
        ctx.tenant_id
    } else {
        Some(ctx.require_tenant()?)
    };

    let event = state
        .alert_store()
        .close_event(tenant_filter, event_id)
        .await
        .map_err(map_core_error)?;
    Ok(Json(event))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/alerts", get(list_events))
        .route("/api/alerts/rules", get(list_rules).post(create_rule))
        .route("/api/alerts/{event_id}/ack", post(acknowledge_event))
        .route("/api/alerts/{event_id}/close", post(close_event))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use hf_core::alert::{NewAlertRule, RuleSpec, Severity};

    use crate::state::test_support::build_state;
    use crate::testutil::{create_tenant, register_user};

    #[tokio::test]
    async fn rule_create_and_event_lifecycle() {
        let (state, _temp_dir) = build_state().await;
        let admin_token = register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let app = super::router().with_state(state.clone());

        let created = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/alerts/rules")
                    .header("Authorization", format!("Bearer {}", admin_token))
                    .header("x-tenant-id", tenant.id.to_string())
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        json!({
                            "name": "overheat",
                            "type": "OVER_TEMP",
                            "thresholdC": 80.0,
                            "severity": "CRITICAL"
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let body = to_bytes(created.into_body(), usize::MAX).await.unwrap();
        let rule_json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(rule_json["type"], "OVER_TEMP");
        assert_eq!(rule_json["enabled"], json!(true));

        // open an event directly through the store and walk it via routes
        let rules = state.alert_store().list_rules(tenant.id).await;
        let event = state
            .alert_store()
            .open_event(&rules[0], Uuid::new_v4(), json!({}))
            .await
            .unwrap();

        let acked = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/alerts/{}/ack", event.id))
                    .header("Authorization", format!("Bearer {}", admin_token))
                    .header("x-tenant-id", tenant.id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(acked.status(), StatusCode::OK);
        let body = to_bytes(acked.into_body(), usize::MAX).await.unwrap();
        let payload: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["status"], "ACKNOWLEDGED");
        assert!(payload["acknowledgedAt"].as_str().is_some());

        let closed = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/alerts/{}/close", event.id))
                    .header("Authorization", format!("Bearer {}", admin_token))
                    .header("x-tenant-id", tenant.id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(closed.status(), StatusCode::OK);
        let body = to_bytes(closed.into_body(), usize::MAX).await.unwrap();
        let payload: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["status"], "CLOSED");

        let listed = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/alerts?status=CLOSED")
                    .header("Authorization", format!("Bearer {}", admin_token))
                    .header("x-tenant-id", tenant.id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(listed.status(), StatusCode::OK);
        let body = to_bytes(listed.into_body(), usize::MAX).await.unwrap();
        let payload: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["total"], json!(1));
    }

    #[tokio::test]
    async fn events_are_invisible_across_tenants() {
        let (state, _temp_dir) = build_state().await;
        let admin_token = register_user(&state, "root@example.com").await;
        let tenant_a = create_tenant(&state, "Tenant A").await;
        let tenant_b = create_tenant(&state, "Tenant B").await;
        let rule = state
            .alert_store()
            .create_rule(
                tenant_a.id,
                NewAlertRule {
                    name: "silence".to_string(),
                    enabled: true,
                    spec: RuleSpec::NoTelemetry {
                        threshold_minutes: None,
                    },
                    severity: Severity::Warning,
                },
            )
            .await
            .unwrap();
        let event = state
            .alert_store()
            .open_event(&rule, Uuid::new_v4(), json!({}))
            .await
            .unwrap();
        let app = super::router().with_state(state);

        let missing = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/alerts/{}/ack", event.id))
                    .header("Authorization", format!("Bearer {}", admin_token))
                    .header("x-tenant-id", tenant_b.id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
