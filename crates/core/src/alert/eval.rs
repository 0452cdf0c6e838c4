//! Pure rule predicates
//!
//! Each variant answers "should this rule fire for this device right now"
//! from the device row, its twin and a slice of recent telemetry. The sweep
//! job owns the store round-trips; nothing here touches storage.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::fleet::{Device, DeviceTwin, MetricValue, Telemetry};

use super::model::RuleSpec;

/// Deployment-level parameter defaults.
#[derive(Debug, Clone)]
pub struct EvalDefaults {
    pub no_telemetry_threshold_minutes: i64,
    pub over_temp_threshold_c: f64,
    pub sensor_out_of_range_repeat_count: usize,
}

impl Default for EvalDefaults {
    fn default() -> Self {
        Self {
            no_telemetry_threshold_minutes: 30,
            over_temp_threshold_c: 85.0,
            sensor_out_of_range_repeat_count: 3,
        }
    }
}

const POSSIBLE_LEAK_DEFAULT_LOOKBACK_MINUTES: i64 = 60;
const POSSIBLE_LEAK_MIN_SAMPLES: usize = 5;
const POSSIBLE_LEAK_MAX_SAMPLES: usize = 10;
const POSSIBLE_LEAK_FLOW_LPM: f64 = 0.1;
const SENSOR_DEFAULT_METRIC: &str = "tankTempC";
const SENSOR_DEFAULT_MIN: f64 = -10.0;
const SENSOR_DEFAULT_MAX: f64 = 120.0;

/// What slice of recent telemetry a rule needs, most recent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryNeeds {
    pub limit: usize,
    pub within_minutes: Option<i64>,
}

impl RuleSpec {
    /// Telemetry window to fetch before calling [`RuleSpec::should_fire`].
    /// `None` means the rule reads no raw telemetry.
    pub fn telemetry_needs(&self, defaults: &EvalDefaults) -> Option<TelemetryNeeds> {
        match self {
            Self::NoTelemetry { .. } | Self::OverTemp { .. } => None,
            Self::PossibleLeak { lookback_minutes } => Some(TelemetryNeeds {
                limit: POSSIBLE_LEAK_MAX_SAMPLES,
                within_minutes: Some(
                    lookback_minutes.unwrap_or(POSSIBLE_LEAK_DEFAULT_LOOKBACK_MINUTES),
                ),
            }),
            Self::SensorOutOfRange { repeat_count, .. } => Some(TelemetryNeeds {
                limit: repeat_count.unwrap_or(defaults.sensor_out_of_range_repeat_count),
                within_minutes: None,
            }),
        }
    }

    /// Evaluate the predicate. Returns the event details when it fires.
    pub fn should_fire(
        &self,
        defaults: &EvalDefaults,
        now: DateTime<Utc>,
        device: &Device,
        twin: Option<&DeviceTwin>,
        recent: &[Telemetry],
    ) -> Option<Value> {
        match self {
            Self::NoTelemetry { threshold_minutes } => {
                let threshold =
                    threshold_minutes.unwrap_or(defaults.no_telemetry_threshold_minutes);
                let cutoff = now - Duration::minutes(threshold);
                let silent = match device.last_seen_at {
                    None => true,
                    Some(seen) => seen < cutoff,
                };
                silent.then(|| {
                    json!({
                        "lastSeenAt": device.last_seen_at,
                        "thresholdMinutes": threshold,
                    })
                })
            }
            Self::OverTemp { threshold_c } => {
                let threshold = threshold_c.unwrap_or(defaults.over_temp_threshold_c);
                let last = twin
                    .and_then(|twin| twin.derived_state.get("lastTankTempC"))
                    .and_then(Value::as_f64)?;
                (last > threshold).then(|| {
                    json!({
                        "lastTankTempC": last,
                        "thresholdC": threshold,
                    })
                })
            }
            Self::PossibleLeak { lookback_minutes } => {
                let lookback =
                    lookback_minutes.unwrap_or(POSSIBLE_LEAK_DEFAULT_LOOKBACK_MINUTES);
                if recent.len() < POSSIBLE_LEAK_MIN_SAMPLES {
                    return None;
                }
                let all_flowing = recent.iter().all(|row| {
                    row.metrics
                        .get("flowLpm")
                        .and_then(MetricValue::as_f64)
                        .is_some_and(|flow| flow > POSSIBLE_LEAK_FLOW_LPM)
                });
                all_flowing.then(|| {
                    json!({
                        "samples": recent.len(),
                        "lookbackMinutes": lookback,
                    })
                })
            }
            Self::SensorOutOfRange {
                metric,
                min,
                max,
                repeat_count,
            } => {
                let metric = metric.as_deref().unwrap_or(SENSOR_DEFAULT_METRIC);
                let min = min.unwrap_or(SENSOR_DEFAULT_MIN);
                let max = max.unwrap_or(SENSOR_DEFAULT_MAX);
                let repeat = repeat_count.unwrap_or(defaults.sensor_out_of_range_repeat_count);
                if recent.len() < repeat {
                    return None;
                }
                let values: Vec<f64> = recent
                    .iter()
                    .take(repeat)
                    .filter_map(|row| row.metrics.get(metric).and_then(MetricValue::as_f64))
                    .collect();
                if values.len() < repeat {
                    return None;
                }
                // values exactly at min or max are in range
                let all_outside = values.iter().all(|v| *v < min || *v > max);
                all_outside.then(|| {
                    json!({
                        "metric": metric,
                        "min": min,
                        "max": max,
                        "repeatCount": repeat,
                        "values": values,
                    })
                })
            }
        }
    }
}
