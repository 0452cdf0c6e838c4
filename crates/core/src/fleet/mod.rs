//! Fleet module
//!
//! Sites, devices, device secrets, telemetry and device twins, plus the
//! telemetry ingest fan-out that keeps them consistent.

mod geo;
mod model;
mod store;

pub use geo::haversine_km;
pub use model::*;
pub use store::{
    DeviceCounts, FleetStore, AUDIT_DEVICE_GEO_LARGE_JUMP, AUDIT_SITE_LOCATION_SET_FROM_DEVICE,
};
