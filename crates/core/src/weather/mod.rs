//! Weather module
//!
//! Per-site per-day observations pulled from the weather provider.

mod model;
mod store;

pub use model::*;
pub use store::WeatherStore;
