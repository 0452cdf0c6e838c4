//! Background jobs
//!
//! In-process scheduling: one spawned loop per job. Sweeps are idempotent;
//! per-device and per-rule failures are logged and skipped, never fatal.

pub mod alert_eval;
pub mod notify_drain;
pub mod rollup;
pub mod weather_pull;

use crate::state::AppState;

pub fn start_background_jobs(state: &AppState) {
    alert_eval::start(state.clone());
    notify_drain::start(state.clone());
    rollup::start(state.clone());
    weather_pull::start(state.clone());
}
