//! Alert module
//!
//! Tenant-scoped rules, the pure rule predicates, and the event store with
//! its dedupe-key uniqueness guarantee.

mod eval;
mod model;
mod store;

pub use eval::{EvalDefaults, TelemetryNeeds};
pub use model::*;
pub use store::AlertStore;
