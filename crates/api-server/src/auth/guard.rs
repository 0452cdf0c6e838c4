//! Request guards
//!
//! Bearer-session extraction, device-identity extraction and the tenant
//! context resolution that backs every tenant-scoped route.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use uuid::Uuid;

use crate::error::{
    forbidden, map_identity_error, unauthorized, validation_error, ApiResult,
};
use crate::state::AppState;

use super::device::verify_device_token;
use super::jwt::verify_user_token;
use super::store::{AuthedUser, Role};

const TENANT_HEADER: &str = "x-tenant-id";

/// The tenant a request acts on, plus the caller's standing there.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    pub tenant_id: Option<Uuid>,
    pub role: Option<Role>,
    pub platform_admin: bool,
}

impl TenantContext {
    /// The active tenant id, required. Platform admins acting globally on
    /// an operation that needs a tenant get a FORBIDDEN, same as anyone.
    pub fn require_tenant(&self) -> ApiResult<Uuid> {
        self.tenant_id
            .ok_or_else(|| forbidden("No active tenant for this request"))
    }
}

fn bearer_token(headers: &HeaderMap) -> ApiResult<&str> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;
    let value = header
        .to_str()
        .map_err(|_| unauthorized("Invalid Authorization header"))?;
    value
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Authorization header must use Bearer token"))
}

/// Verify the user bearer token and load the account with its memberships.
pub async fn user_session_from_headers(
    state: &AppState,
    headers: &HeaderMap,
) -> ApiResult<AuthedUser> {
    let token = bearer_token(headers)?;
    let claims =
        verify_user_token(token, &state.config().jwt_secret).map_err(unauthorized)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| unauthorized("Invalid token subject"))?;
    state
        .identity_store()
        .session(user_id)
        .await
        .map_err(map_identity_error)
}

/// Verify a device MAC token. Devices may send the raw token or prefix it
/// with `Bearer `.
pub fn device_identity_from_headers(state: &AppState, headers: &HeaderMap) -> ApiResult<Uuid> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;
    let value = header
        .to_str()
        .map_err(|_| unauthorized("Invalid Authorization header"))?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value);
    verify_device_token(token, &state.config().device_hmac_secret).map_err(unauthorized)
}

/// Resolve the active tenant: URL path parameter first, then the
/// `x-tenant-id` header, then a `tenantId` query value. Platform admins
/// may act without a tenant or target any tenant; everyone else needs a
/// membership in the resolved tenant.
pub fn tenant_context(
    user: &AuthedUser,
    path_tenant: Option<Uuid>,
    headers: &HeaderMap,
    query_tenant: Option<Uuid>,
) -> ApiResult<TenantContext> {
    let header_tenant = match headers.get(TENANT_HEADER) {
        None => None,
        Some(raw) => {
            let value = raw
                .to_str()
                .map_err(|_| validation_error("Invalid x-tenant-id header"))?;
            Some(
                Uuid::parse_str(value)
                    .map_err(|_| validation_error("Invalid x-tenant-id header"))?,
            )
        }
    };
    let resolved = path_tenant.or(header_tenant).or(query_tenant);

    if user.is_platform_admin() {
        return Ok(TenantContext {
            tenant_id: resolved,
            role: resolved.and_then(|tenant| user.role_in(tenant)),
            platform_admin: true,
        });
    }

    let tenant_id = resolved.ok_or_else(|| forbidden("No active tenant for this request"))?;
    let role = user
        .role_in(tenant_id)
        .ok_or_else(|| forbidden("No membership in the active tenant"))?;
    Ok(TenantContext {
        tenant_id: Some(tenant_id),
        role: Some(role),
        platform_admin: false,
    })
}

/// Pass when the caller is a platform admin or holds one of the allowed
/// roles in the active tenant.
pub fn require_role(ctx: &TenantContext, allowed: &[Role]) -> ApiResult<()> {
    if ctx.platform_admin {
        return Ok(());
    }
    match ctx.role {
        Some(role) if allowed.contains(&role) => Ok(()),
        _ => Err(forbidden("Insufficient role for this operation")),
    }
}
