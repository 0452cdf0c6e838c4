//! File-backed firmware catalog and OTA jobs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{Error, Result};

use super::model::*;

#[derive(Debug, Default)]
struct OtaState {
    firmware: HashMap<Uuid, FirmwarePackage>,
    jobs: HashMap<Uuid, OtaJob>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredOtaState {
    firmware: Vec<FirmwarePackage>,
    jobs: Vec<OtaJob>,
}

pub struct OtaStore {
    state: RwLock<OtaState>,
    file_path: PathBuf,
}

impl OtaStore {
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        let file_path = data_dir.join("ota.json");
        let state = load_state(&file_path).await?;
        Ok(Self {
            state: RwLock::new(state),
            file_path,
        })
    }

    // --- firmware catalog ---

    pub async fn create_firmware(&self, new: NewFirmwarePackage) -> Result<FirmwarePackage> {
        let version = new.version.trim();
        if version.is_empty() {
            return Err(Error::InvalidInput(
                "Firmware version cannot be empty".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if state.firmware.values().any(|fw| fw.version == version) {
            return Err(Error::Conflict(format!(
                "Firmware version '{}' already exists",
                version
            )));
        }

        let firmware = FirmwarePackage {
            id: Uuid::new_v4(),
            version: version.to_string(),
            download_url: new.download_url,
            checksum: new.checksum,
            release_notes: new.release_notes,
            created_at: Utc::now(),
        };
        state.firmware.insert(firmware.id, firmware.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(firmware)
    }

    pub async fn list_firmware(&self) -> Vec<FirmwarePackage> {
        let state = self.state.read().await;
        let mut firmware: Vec<FirmwarePackage> = state.firmware.values().cloned().collect();
        firmware.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        firmware
    }

    pub async fn get_firmware(&self, firmware_id: Uuid) -> Result<FirmwarePackage> {
        let state = self.state.read().await;
        state
            .firmware
            .get(&firmware_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Firmware {} not found", firmware_id)))
    }

    // --- jobs ---

    pub async fn schedule_job(&self, tenant_id: Uuid, new: NewOtaJob) -> Result<OtaJob> {
        match new.target_type {
            OtaTargetType::Device if new.device_id.is_none() => {
                return Err(Error::InvalidInput(
                    "DEVICE target requires a deviceId".to_string(),
                ));
            }
            OtaTargetType::Group if new.group_filter.is_none() => {
                return Err(Error::InvalidInput(
                    "GROUP target requires a groupFilter".to_string(),
                ));
            }
            _ => {}
        }

        let mut state = self.state.write().await;
        if !state.firmware.contains_key(&new.firmware_id) {
            return Err(Error::NotFound(format!(
                "Firmware {} not found",
                new.firmware_id
            )));
        }

        let now = Utc::now();
        let job = OtaJob {
            id: Uuid::new_v4(),
            tenant_id,
            target_type: new.target_type,
            device_id: new.device_id,
            group_filter: new.group_filter,
            firmware_id: new.firmware_id,
            status: OtaJobStatus::Scheduled,
            scheduled_at: new.scheduled_at,
            started_at: None,
            finished_at: None,
            progress: Value::Null,
            error_msg: None,
            created_at: now,
            updated_at: now,
        };
        state.jobs.insert(job.id, job.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(job)
    }

    pub async fn list_jobs(&self, tenant_id: Uuid) -> Vec<OtaJob> {
        let state = self.state.read().await;
        let mut jobs: Vec<OtaJob> = state
            .jobs
            .values()
            .filter(|job| job.tenant_id == tenant_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn get_job(&self, tenant_id: Option<Uuid>, job_id: Uuid) -> Result<OtaJob> {
        let state = self.state.read().await;
        state
            .jobs
            .get(&job_id)
            .filter(|job| tenant_id.is_none_or(|t| job.tenant_id == t))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("OTA job {} not found", job_id)))
    }

    /// The earliest-scheduled live job targeting the device, if any.
    pub async fn pending_for_device(
        &self,
        device_tenant_id: Uuid,
        device_id: Uuid,
    ) -> Option<OtaJob> {
        let state = self.state.read().await;
        state
            .jobs
            .values()
            .filter(|job| job.tenant_id == device_tenant_id)
            .filter(|job| {
                matches!(job.status, OtaJobStatus::Scheduled | OtaJobStatus::InProgress)
            })
            .filter(|job| match job.target_type {
                OtaTargetType::Device => job.device_id == Some(device_id),
                OtaTargetType::Group => true,
            })
            .min_by_key(|job| job.scheduled_at)
            .cloned()
    }

    /// Apply a device progress report. Returns the updated job; the caller
    /// propagates the firmware version to the device on SUCCESS.
    pub async fn report(
        &self,
        device_tenant_id: Uuid,
        job_id: Uuid,
        status: OtaReportStatus,
        progress: Option<Value>,
        error_msg: Option<String>,
    ) -> Result<OtaJob> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(&job_id)
            .filter(|job| job.tenant_id == device_tenant_id)
            .ok_or_else(|| Error::NotFound(format!("OTA job {} not found", job_id)))?;

        match status {
            OtaReportStatus::InProgress => {
                if job.status == OtaJobStatus::Scheduled {
                    job.status = OtaJobStatus::InProgress;
                    job.started_at = Some(now);
                }
            }
            OtaReportStatus::Success => {
                job.status = OtaJobStatus::Success;
                job.finished_at = Some(now);
            }
            OtaReportStatus::Failed => {
                job.status = OtaJobStatus::Failed;
                job.finished_at = Some(now);
            }
        }
        if let Some(progress) = progress {
            job.progress = progress;
        }
        if error_msg.is_some() {
            job.error_msg = error_msg;
        }
        job.updated_at = now;

        let job = job.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(job)
    }

    /// Administrative cancel.
    pub async fn cancel_job(&self, tenant_id: Option<Uuid>, job_id: Uuid) -> Result<OtaJob> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(&job_id)
            .filter(|job| tenant_id.is_none_or(|t| job.tenant_id == t))
            .ok_or_else(|| Error::NotFound(format!("OTA job {} not found", job_id)))?;
        if !matches!(job.status, OtaJobStatus::Scheduled | OtaJobStatus::InProgress) {
            return Err(Error::Conflict(format!(
                "OTA job {} already finished",
                job_id
            )));
        }
        let now = Utc::now();
        job.status = OtaJobStatus::Canceled;
        job.finished_at = Some(now);
        job.updated_at = now;

        let job = job.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(job)
    }
}

async fn load_state(path: &Path) -> Result<OtaState> {
    if !path.exists() {
        return Ok(OtaState::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(OtaState::default());
    }
    let stored: StoredOtaState = serde_json::from_str(&content)?;
    Ok(OtaState {
        firmware: stored.firmware.into_iter().map(|f| (f.id, f)).collect(),
        jobs: stored.jobs.into_iter().map(|j| (j.id, j)).collect(),
    })
}

async fn persist_state(path: &Path, state: &OtaState) -> Result<()> {
    let stored = StoredOtaState {
        firmware: state.firmware.values().cloned().collect(),
        jobs: state.jobs.values().cloned().collect(),
    };
    let content = serde_json::to_string_pretty(&stored)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
