//! File-backed weather observations, upserted on (site, date)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::Result;

use super::model::*;

#[derive(Debug, Default)]
struct WeatherState {
    observations: HashMap<(Uuid, NaiveDate), WeatherData>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredWeatherState {
    observations: Vec<WeatherData>,
}

pub struct WeatherStore {
    state: RwLock<WeatherState>,
    file_path: PathBuf,
}

impl WeatherStore {
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        let file_path = data_dir.join("weather.json");
        let state = load_state(&file_path).await?;
        Ok(Self {
            state: RwLock::new(state),
            file_path,
        })
    }

    pub async fn upsert(
        &self,
        site_id: Uuid,
        date: NaiveDate,
        observation: WeatherObservation,
    ) -> Result<WeatherData> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let row = state
            .observations
            .entry((site_id, date))
            .and_modify(|row| {
                row.temp_min_c = observation.temp_min_c;
                row.temp_max_c = observation.temp_max_c;
                row.humidity_pct = observation.humidity_pct;
                row.solar_irradiance_wh_m2 = observation.solar_irradiance_wh_m2;
                row.updated_at = now;
            })
            .or_insert_with(|| WeatherData {
                id: Uuid::new_v4(),
                site_id,
                date,
                temp_min_c: observation.temp_min_c,
                temp_max_c: observation.temp_max_c,
                humidity_pct: observation.humidity_pct,
                solar_irradiance_wh_m2: observation.solar_irradiance_wh_m2,
                created_at: now,
                updated_at: now,
            })
            .clone();
        persist_state(&self.file_path, &state).await?;
        Ok(row)
    }

    pub async fn for_site(&self, site_id: Uuid, limit: usize) -> Vec<WeatherData> {
        let state = self.state.read().await;
        let mut rows: Vec<WeatherData> = state
            .observations
            .values()
            .filter(|row| row.site_id == site_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        rows.truncate(limit);
        rows
    }
}

async fn load_state(path: &Path) -> Result<WeatherState> {
    if !path.exists() {
        return Ok(WeatherState::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(WeatherState::default());
    }
    let stored: StoredWeatherState = serde_json::from_str(&content)?;
    Ok(WeatherState {
        observations: stored
            .observations
            .into_iter()
            .map(|w| ((w.site_id, w.date), w))
            .collect(),
    })
}

async fn persist_state(path: &Path, state: &WeatherState) -> Result<()> {
    let stored = StoredWeatherState {
        observations: state.observations.values().cloned().collect(),
    };
    let content = serde_json::to_string_pretty(&stored)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
