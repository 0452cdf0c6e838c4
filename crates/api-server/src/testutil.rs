//! Shared helpers for route tests

use uuid::Uuid;

use hf_core::fleet::{Device, NewDevice, NewSite, Site};

use crate::auth::{device_token, issue_user_token, Role, Tenant, TenantType};
use crate::state::AppState;

pub(crate) const TEST_PASSWORD: &str = "verysecurepw";

/// Register a user and return a bearer token. The first call in a fresh
/// state bootstraps the platform admin.
pub(crate) async fn register_user(state: &AppState, email: &str) -> String {
    let (user, _) = state
        .identity_store()
        .register_user(email, TEST_PASSWORD, "Test User")
        .await
        .unwrap();
    let config = state.config();
    issue_user_token(
        &user.id.to_string(),
        &user.email,
        &config.jwt_secret,
        config.jwt_expires_in_hours,
    )
    .unwrap()
}

pub(crate) async fn create_tenant(state: &AppState, name: &str) -> Tenant {
    state
        .identity_store()
        .create_tenant(name, TenantType::Retailer)
        .await
        .unwrap()
}

/// Invite an existing-or-new user into a tenant and return their token.
pub(crate) async fn invite_member(
    state: &AppState,
    tenant_id: Uuid,
    email: &str,
    role: &str,
) -> String {
    let role = match role {
        "PLATFORM_ADMIN" => Role::PlatformAdmin,
        "TENANT_ADMIN" => Role::TenantAdmin,
        "INSTALLER" => Role::Installer,
        "SUPPORT_AGENT" => Role::SupportAgent,
        _ => Role::EndUser,
    };
    let (user, _) = state
        .identity_store()
        .invite_user(tenant_id, email, "Member", role, Some(TEST_PASSWORD))
        .await
        .unwrap();
    let config = state.config();
    issue_user_token(
        &user.id.to_string(),
        &user.email,
        &config.jwt_secret,
        config.jwt_expires_in_hours,
    )
    .unwrap()
}

/// Provision a device straight through the store, returning it with its
/// MAC token.
pub(crate) async fn provision_device(
    state: &AppState,
    tenant_id: Uuid,
    serial: &str,
    site_id: Option<Uuid>,
) -> (Device, String) {
    let device_id = Uuid::new_v4();
    let token = device_token(device_id, &state.config().device_hmac_secret);
    let digest = token.split_once(':').unwrap().1.to_string();
    let device = state
        .fleet_store()
        .create_device_with_id(
            device_id,
            tenant_id,
            NewDevice {
                serial_number: serial.to_string(),
                model: "SWH-200".to_string(),
                name: None,
                notes: None,
                site_id,
                owner_user_id: None,
                sim_iccid: None,
                tags: Default::default(),
            },
            digest,
        )
        .await
        .unwrap();
    (device, token)
}

pub(crate) async fn create_locked_site(
    state: &AppState,
    tenant_id: Uuid,
    lat: f64,
    lon: f64,
) -> Site {
    state
        .fleet_store()
        .create_site(
            tenant_id,
            NewSite {
                name: "Locked Site".to_string(),
                address_line: None,
                city: None,
                postal_code: None,
                country: None,
                lat: Some(lat),
                lon: Some(lon),
                location_lock: true,
            },
        )
        .await
        .unwrap()
}
