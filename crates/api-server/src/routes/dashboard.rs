//! Tenant dashboard summary

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use hf_core::fleet::DeviceCounts;

use crate::auth::{tenant_context, user_session_from_headers};
use crate::error::ApiResult;
use crate::state::AppState;

const ONLINE_WINDOW_MINUTES: i64 = 30;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub devices: DeviceCounts,
    pub open_alerts_info: usize,
    pub open_alerts_warning: usize,
    pub open_alerts_critical: usize,
    pub queued_commands: usize,
    pub yesterday_energy_kwh: f64,
    pub yesterday_water_liters: f64,
}

async fn summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<DashboardSummary>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, Some(tenant_id), &headers, None)?;
    let tenant_id = ctx.require_tenant()?;

    let devices = state
        .fleet_store()
        .device_counts(tenant_id, Duration::minutes(ONLINE_WINDOW_MINUTES))
        .await;
    let alerts = state.alert_store().open_counts_by_severity(tenant_id).await;
    let queued_commands = state.command_store().queued_count(tenant_id).await;
    let yesterday = (Utc::now() - Duration::days(1)).date_naive();
    let (yesterday_energy_kwh, yesterday_water_liters) =
        state.rollup_store().totals_for_day(tenant_id, yesterday).await;

    use hf_core::alert::Severity;
    Ok(Json(DashboardSummary {
        devices,
        open_alerts_info: alerts.get(&Severity::Info).copied().unwrap_or(0),
        open_alerts_warning: alerts.get(&Severity::Warning).copied().unwrap_or(0),
        open_alerts_critical: alerts.get(&Severity::Critical).copied().unwrap_or(0),
        queued_commands,
        yesterday_energy_kwh,
        yesterday_water_liters,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/tenants/{tenant_id}/dashboard/summary",
        get(summary),
    )
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::state::test_support::build_state;
    use crate::testutil::{create_tenant, provision_device, register_user};

    #[tokio::test]
    async fn summary_counts_devices() {
        let (state, _temp_dir) = build_state().await;
        let admin_token = register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        provision_device(&state, tenant.id, "SN-1", None).await;
        provision_device(&state, tenant.id, "SN-2", None).await;
        let app = super::router().with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/tenants/{}/dashboard/summary", tenant.id))
                    .header("Authorization", format!("Bearer {}", admin_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["devices"]["total"], 2);
        assert_eq!(payload["devices"]["provisioned"], 2);
        assert_eq!(payload["queuedCommands"], 0);
    }

    #[tokio::test]
    async fn path_tenant_is_enforced() {
        let (state, _temp_dir) = build_state().await;
        register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let outsider_token = register_user(&state, "outsider@example.com").await;
        let app = super::router().with_state(state);

        let denied = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/tenants/{}/dashboard/summary", tenant.id))
                    .header("Authorization", format!("Bearer {}", outsider_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }
}
