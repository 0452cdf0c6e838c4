//! Daily aggregation math
//!
//! Readings must be ordered by ts ascending and confined to one calendar
//! day. The interval attributed to a reading is the minutes since the
//! previous one; the first reading counts as 5 minutes.

use crate::fleet::{MetricValue, Telemetry};

use super::model::RollupValues;

const FIRST_INTERVAL_MINUTES: f64 = 5.0;

pub fn compute_daily_rollup(readings: &[Telemetry]) -> RollupValues {
    let mut energy_kwh = 0.0;
    let mut water_liters = 0.0;
    let mut heater_minutes = 0.0;
    let mut tank_min: Option<f64> = None;
    let mut tank_max: Option<f64> = None;
    let mut ambient_sum = 0.0;
    let mut ambient_count = 0usize;

    let mut prev_ts: Option<chrono::DateTime<chrono::Utc>> = None;
    for reading in readings {
        let interval_minutes = match prev_ts {
            None => FIRST_INTERVAL_MINUTES,
            Some(prev) => (reading.ts - prev).num_seconds() as f64 / 60.0,
        };
        prev_ts = Some(reading.ts);

        if let Some(power_w) = metric(reading, "powerW") {
            energy_kwh += (power_w / 1000.0) * (interval_minutes / 60.0);
        }
        if let Some(flow_lpm) = metric(reading, "flowLpm") {
            water_liters += flow_lpm * interval_minutes;
        }
        if reading
            .metrics
            .get("heaterOn")
            .and_then(MetricValue::as_bool)
            .unwrap_or(false)
        {
            heater_minutes += interval_minutes;
        }
        if let Some(tank) = metric(reading, "tankTempC") {
            tank_min = Some(tank_min.map_or(tank, |m: f64| m.min(tank)));
            tank_max = Some(tank_max.map_or(tank, |m: f64| m.max(tank)));
        }
        if let Some(ambient) = metric(reading, "ambientTempC") {
            ambient_sum += ambient;
            ambient_count += 1;
        }
    }

    RollupValues {
        energy_kwh: round2(energy_kwh),
        water_liters: round2(water_liters),
        heater_on_minutes: heater_minutes.round() as i64,
        tank_temp_min: tank_min.map(round2),
        tank_temp_max: tank_max.map(round2),
        ambient_temp_avg: (ambient_count > 0)
            .then(|| round1(ambient_sum / ambient_count as f64)),
    }
}

fn metric(reading: &Telemetry, name: &str) -> Option<f64> {
    reading.metrics.get(name).and_then(MetricValue::as_f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
