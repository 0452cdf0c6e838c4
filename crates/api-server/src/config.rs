//! Deployment configuration
//!
//! Read once at boot from the environment; every key has a working default
//! so a bare `api-server` starts locally.

use chrono::NaiveTime;

const DEFAULT_JWT_SECRET: &str = "dev-jwt-secret-change-me";
const DEFAULT_DEVICE_HMAC_SECRET: &str = "dev-device-hmac-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expires_in_hours: i64,
    pub device_hmac_secret: String,
    pub alert_eval_interval_minutes: u64,
    pub no_telemetry_threshold_minutes: i64,
    pub over_temp_threshold_c: f64,
    pub sensor_out_of_range_repeat_count: usize,
    pub rollup_time: NaiveTime,
    pub weather_time: NaiveTime,
    pub data_dir: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parsed("PORT", 3000),
            jwt_secret: env_string("JWT_SECRET", DEFAULT_JWT_SECRET),
            jwt_expires_in_hours: env_hours("JWT_EXPIRES_IN", 24),
            device_hmac_secret: env_string("DEVICE_HMAC_SECRET", DEFAULT_DEVICE_HMAC_SECRET),
            alert_eval_interval_minutes: env_parsed("ALERT_EVAL_INTERVAL_MINUTES", 5),
            no_telemetry_threshold_minutes: env_parsed("NO_TELEMETRY_THRESHOLD_MINUTES", 30),
            over_temp_threshold_c: env_parsed("OVER_TEMP_THRESHOLD_C", 85.0),
            sensor_out_of_range_repeat_count: env_parsed("SENSOR_OUT_OF_RANGE_REPEAT_COUNT", 3),
            rollup_time: env_time("ROLLUP_CRON", NaiveTime::from_hms_opt(2, 0, 0).unwrap()),
            weather_time: env_time("WEATHER_CRON", NaiveTime::from_hms_opt(6, 0, 0).unwrap()),
            data_dir: env_string("DATA_DIR", ".hf-data"),
        }
    }

    pub fn eval_defaults(&self) -> hf_core::alert::EvalDefaults {
        hf_core::alert::EvalDefaults {
            no_telemetry_threshold_minutes: self.no_telemetry_threshold_minutes,
            over_temp_threshold_c: self.over_temp_threshold_c,
            sensor_out_of_range_repeat_count: self.sensor_out_of_range_repeat_count,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_expires_in_hours: 24,
            device_hmac_secret: DEFAULT_DEVICE_HMAC_SECRET.to_string(),
            alert_eval_interval_minutes: 5,
            no_telemetry_threshold_minutes: 30,
            over_temp_threshold_c: 85.0,
            sensor_out_of_range_repeat_count: 3,
            rollup_time: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            weather_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            data_dir: ".hf-data".to_string(),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Token lifetime in hours; accepts "24" and the "24h" shorthand.
fn env_hours(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().trim_end_matches('h').parse::<i64>().ok())
        .filter(|hours| *hours > 0)
        .unwrap_or(default)
}

/// "HH:MM" wall-clock mark for the daily jobs.
fn env_time(name: &str, default: NaiveTime) -> NaiveTime {
    std::env::var(name)
        .ok()
        .and_then(|raw| NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_table() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.jwt_expires_in_hours, 24);
        assert_eq!(config.alert_eval_interval_minutes, 5);
        assert_eq!(config.no_telemetry_threshold_minutes, 30);
        assert_eq!(config.over_temp_threshold_c, 85.0);
        assert_eq!(config.sensor_out_of_range_repeat_count, 3);
        assert_eq!(config.rollup_time, NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        assert_eq!(config.weather_time, NaiveTime::from_hms_opt(6, 0, 0).unwrap());
    }
}
