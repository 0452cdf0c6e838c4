//! Core library for the HelioFleet control plane
//!
//! This crate contains the device-facing domain logic, including:
//! - Fleet management (sites, devices, telemetry, device twins)
//! - Command queueing
//! - Alert rules and evaluation
//! - Notification fan-out
//! - OTA firmware rollouts
//! - Entitlements, daily rollups and weather records

pub mod alert;
pub mod command;
pub mod entitlement;
pub mod error;
pub mod fleet;
pub mod integrations;
pub mod notify;
pub mod ota;
pub mod rollup;
pub mod weather;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
