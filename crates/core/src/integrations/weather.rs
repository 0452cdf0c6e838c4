//! Weather provider interface

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::weather::WeatherObservation;
use crate::Result;

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Observed or forecast conditions for one coordinate and day.
    async fn observe(&self, lat: f64, lon: f64, date: NaiveDate) -> Result<WeatherObservation>;
}

/// Deterministic stand-in used in the reference deployment and in tests.
pub struct StubWeatherProvider;

#[async_trait]
impl WeatherProvider for StubWeatherProvider {
    async fn observe(&self, lat: f64, _lon: f64, date: NaiveDate) -> Result<WeatherObservation> {
        // vary mildly with latitude and day-of-year so repeated pulls for
        // the same key upsert identical rows
        use chrono::Datelike;
        let seasonal = ((date.ordinal() as f64) / 366.0 * std::f64::consts::TAU).sin() * 8.0;
        let base = 18.0 - (lat.abs() / 90.0) * 12.0 + seasonal;
        Ok(WeatherObservation {
            temp_min_c: ((base - 4.0) * 10.0).round() / 10.0,
            temp_max_c: ((base + 6.0) * 10.0).round() / 10.0,
            humidity_pct: 55.0,
            solar_irradiance_wh_m2: Some(3000.0),
        })
    }
}
