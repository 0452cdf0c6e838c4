//! File-backed daily rollups, upserted on (device, day)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::Result;

use super::model::*;

#[derive(Debug, Default)]
struct RollupState {
    rollups: HashMap<(Uuid, NaiveDate), DailyRollup>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredRollupState {
    rollups: Vec<DailyRollup>,
}

pub struct RollupStore {
    state: RwLock<RollupState>,
    file_path: PathBuf,
}

impl RollupStore {
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        let file_path = data_dir.join("rollups.json");
        let state = load_state(&file_path).await?;
        Ok(Self {
            state: RwLock::new(state),
            file_path,
        })
    }

    pub async fn upsert(
        &self,
        tenant_id: Uuid,
        device_id: Uuid,
        day_date: NaiveDate,
        values: RollupValues,
    ) -> Result<DailyRollup> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let rollup = state
            .rollups
            .entry((device_id, day_date))
            .and_modify(|row| {
                row.energy_kwh = values.energy_kwh;
                row.water_liters = values.water_liters;
                row.heater_on_minutes = values.heater_on_minutes;
                row.tank_temp_min = values.tank_temp_min;
                row.tank_temp_max = values.tank_temp_max;
                row.ambient_temp_avg = values.ambient_temp_avg;
                row.updated_at = now;
            })
            .or_insert_with(|| DailyRollup {
                id: Uuid::new_v4(),
                tenant_id,
                device_id,
                day_date,
                energy_kwh: values.energy_kwh,
                water_liters: values.water_liters,
                heater_on_minutes: values.heater_on_minutes,
                tank_temp_min: values.tank_temp_min,
                tank_temp_max: values.tank_temp_max,
                ambient_temp_avg: values.ambient_temp_avg,
                created_at: now,
                updated_at: now,
            })
            .clone();
        persist_state(&self.file_path, &state).await?;
        Ok(rollup)
    }

    pub async fn get(&self, device_id: Uuid, day_date: NaiveDate) -> Option<DailyRollup> {
        let state = self.state.read().await;
        state.rollups.get(&(device_id, day_date)).cloned()
    }

    pub async fn list_for_device(&self, device_id: Uuid, limit: usize) -> Vec<DailyRollup> {
        let state = self.state.read().await;
        let mut rollups: Vec<DailyRollup> = state
            .rollups
            .values()
            .filter(|row| row.device_id == device_id)
            .cloned()
            .collect();
        rollups.sort_by(|a, b| b.day_date.cmp(&a.day_date));
        rollups.truncate(limit);
        rollups
    }

    /// Tenant-wide energy and water totals for one day.
    pub async fn totals_for_day(&self, tenant_id: Uuid, day_date: NaiveDate) -> (f64, f64) {
        let state = self.state.read().await;
        state
            .rollups
            .values()
            .filter(|row| row.tenant_id == tenant_id && row.day_date == day_date)
            .fold((0.0, 0.0), |(energy, water), row| {
                (energy + row.energy_kwh, water + row.water_liters)
            })
    }
}

async fn load_state(path: &Path) -> Result<RollupState> {
    if !path.exists() {
        return Ok(RollupState::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(RollupState::default());
    }
    let stored: StoredRollupState = serde_json::from_str(&content)?;
    Ok(RollupState {
        rollups: stored
            .rollups
            .into_iter()
            .map(|r| ((r.device_id, r.day_date), r))
            .collect(),
    })
}

async fn persist_state(path: &Path, state: &RollupState) -> Result<()> {
    let stored = StoredRollupState {
        rollups: state.rollups.values().cloned().collect(),
    };
    let content = serde_json::to_string_pretty(&stored)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
