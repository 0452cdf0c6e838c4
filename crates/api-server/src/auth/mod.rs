//! Authentication and tenancy
//!
//! Two verifiers: signed bearer claims for humans, HMAC tokens for devices.
//! The guard resolves the active tenant and enforces role policy.

mod device;
mod guard;
mod jwt;
mod store;

pub use device::{device_token, verify_device_token};
pub use guard::{
    device_identity_from_headers, require_role, tenant_context, user_session_from_headers,
    TenantContext,
};
pub use jwt::{issue_user_token, verify_user_token, UserClaims};
pub use store::{
    AuthedUser, IdentityError, IdentityStore, Membership, MembershipInfo, Role, Tenant,
    TenantStatus, TenantType, UserStatus, UserSummary,
};
