//! Entitlement module
//!
//! Feature flags resolved with device-over-tenant precedence and a
//! per-key default table.

mod model;
mod store;

pub use model::*;
pub use store::EntitlementStore;
