//! Rollup model definitions

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRollup {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub device_id: Uuid,
    pub day_date: NaiveDate,
    pub energy_kwh: f64,
    pub water_liters: f64,
    pub heater_on_minutes: i64,
    pub tank_temp_min: Option<f64>,
    pub tank_temp_max: Option<f64>,
    pub ambient_temp_avg: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The computed aggregate before it is keyed and stored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RollupValues {
    pub energy_kwh: f64,
    pub water_liters: f64,
    pub heater_on_minutes: i64,
    pub tank_temp_min: Option<f64>,
    pub tank_temp_max: Option<f64>,
    pub ambient_temp_avg: Option<f64>,
}
