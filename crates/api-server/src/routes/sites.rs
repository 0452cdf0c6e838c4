//! Site management

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch},
    Json, Router,
};
use uuid::Uuid;

use hf_core::fleet::{NewSite, Site, SiteLocationUpdate};

use crate::auth::{require_role, tenant_context, user_session_from_headers, Role};
use crate::error::{forbidden, map_core_error, ApiResult};
use crate::state::AppState;

use super::TenantQuery;

async fn create_site(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
    Json(req): Json<NewSite>,
) -> ApiResult<(StatusCode, Json<Site>)> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    require_role(&ctx, &[Role::PlatformAdmin, Role::TenantAdmin, Role::Installer])?;
    let tenant_id = ctx.require_tenant()?;

    let site = state
        .fleet_store()
        .create_site(tenant_id, req)
        .await
        .map_err(map_core_error)?;
    Ok((StatusCode::CREATED, Json(site)))
}

async fn list_sites(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<Vec<Site>>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_id = ctx.require_tenant()?;

    let sites = state
        .fleet_store()
        .list_sites(tenant_id)
        .await
        .map_err(map_core_error)?;
    Ok(Json(sites))
}

/// User-driven location update. Any member role may edit; END_USER only
/// for sites that carry one of their own devices.
async fn update_location(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(site_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
    Json(mut req): Json<SiteLocationUpdate>,
) -> ApiResult<Json<Site>> {
    let session = user_session_from_headers(&state, &headers).await?;
    let ctx = tenant_context(&session, None, &headers, query.tenant_id)?;
    let tenant_filter = if ctx.platform_admin {
        ctx.tenant_id
    } else {
        Some(ctx.require_tenant()?)
    };

    if ctx.role == Some(Role::EndUser) && !ctx.platform_admin {
        let owns = state
            .fleet_store()
            .site_has_device_owned_by(site_id, session.user.id)
            .await;
        if !owns {
            return Err(forbidden("End users may only edit sites holding their own devices"));
        }
    }

    // best-effort address backfill when the caller sent none
    if req.address_line.is_none() && req.city.is_none() {
        if let Ok(Some(address)) = state
            .geocoding_provider()
            .reverse_geocode(req.lat, req.lon)
            .await
        {
            req.address_line = Some(address.address_line);
            req.city = Some(address.city);
            req.postal_code = Some(address.postal_code);
            req.country = Some(address.country);
        }
    }

    let site = state
        .fleet_store()
        .update_site_location(tenant_filter, site_id, req, session.user.id)
        .await
        .map_err(map_core_error)?;
    Ok(Json(site))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sites", get(list_sites).post(create_site))
        .route("/api/sites/{site_id}/location", patch(update_location))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::state::test_support::build_state;
    use crate::testutil::{create_tenant, register_user};

    #[tokio::test]
    async fn create_and_relocate_site() {
        let (state, _temp_dir) = build_state().await;
        let admin_token = register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let app = super::router().with_state(state);

        let created = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sites")
                    .header("Authorization", format!("Bearer {}", admin_token))
                    .header("x-tenant-id", tenant.id.to_string())
                    .header("Content-Type", "application/json")
                    .body(Body::from(json!({"name": "Rooftop A"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let body = to_bytes(created.into_body(), usize::MAX).await.unwrap();
        let site: Value = serde_json::from_slice(&body).unwrap();
        assert!(site["lat"].is_null());
        let site_id = site["id"].as_str().unwrap().to_string();

        let relocated = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/api/sites/{}/location", site_id))
                    .header("Authorization", format!("Bearer {}", admin_token))
                    .header("x-tenant-id", tenant.id.to_string())
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        json!({
                            "lat": 37.975,
                            "lon": 23.735,
                            "source": "MANUAL",
                            "lock": true
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(relocated.status(), StatusCode::OK);
        let body = to_bytes(relocated.into_body(), usize::MAX).await.unwrap();
        let site: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(site["lat"], json!(37.975));
        assert_eq!(site["locationLock"], json!(true));
        assert_eq!(site["locationSource"], "MANUAL");
    }
}
