//! Rollup module
//!
//! Per-device per-calendar-day aggregates computed from raw telemetry.

mod compute;
mod model;
mod store;

pub use compute::compute_daily_rollup;
pub use model::*;
pub use store::RollupStore;
