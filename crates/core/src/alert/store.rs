//! File-backed alert rules and events
//!
//! The dedupe key carries a uniqueness constraint over non-null values:
//! concurrent sweeps inserting the same (device, rule) event race on the
//! write lock and the loser gets a Conflict, which callers treat as a
//! benign no-op. Closing an event clears its key so the pair can re-open.

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
struct AlertState {
    rules: HashMap<Uuid, AlertRule>,
    events: HashMap<Uuid, AlertEvent>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredAlertState {
    rules: Vec<AlertRule>,
    events: Vec<AlertEvent>,
}

pub struct AlertStore {
    state: RwLock<AlertState>,
    file_path: PathBuf,
}

impl AlertStore {
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        let file_path = data_dir.join("alerts.json");
        let state = load_state(&file_path).await?;
        Ok(Self {
            state: RwLock::new(state),
            file_path,
        })
    }

    // --- rules ---

    pub async fn create_rule(&self, tenant_id: Uuid, new: NewAlertRule) -> Result<AlertRule> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Rule name cannot be empty".to_string()));
        }

        let now = Utc::now();
        let rule = AlertRule {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            enabled: new.enabled,
            spec: new.spec,
            severity: new.severity,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.rules.insert(rule.id, rule.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(rule)
    }

    pub async fn list_rules(&self, tenant_id: Uuid) -> Vec<AlertRule> {
        let state = self.state.read().await;
        let mut rules: Vec<AlertRule> = state
            .rules
            .values()
            .filter(|rule| rule.tenant_id == tenant_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rules
    }

    /// Every enabled rule across the fleet, for the sweep job.
    pub async fn enabled_rules(&self) -> Vec<AlertRule> {
        let state = self.state.read().await;
        state
            .rules
            .values()
            .filter(|rule| rule.enabled)
            .cloned()
            .collect()
    }

    // --- events ---

    /// True when an OPEN or ACKNOWLEDGED event holds the dedupe key.
    pub async fn has_active_event(&self, key: &str) -> bool {
        let state = self.state.read().await;
        state.events.values().any(|event| {
            event.dedupe_key.as_deref() == Some(key)
                && matches!(event.status, AlertStatus::Open | AlertStatus::Acknowledged)
        })
    }

    /// Open a new event under the dedupe-key unique constraint.
    pub async fn open_event(
        &self,
        rule: &AlertRule,
        device_id: Uuid,
        details: Value,
    ) -> Result<AlertEvent> {
        let key = dedupe_key(device_id, rule.id);
        let mut state = self.state.write().await;
        if state
            .events
            .values()
            .any(|event| event.dedupe_key.as_deref() == Some(key.as_str()))
        {
            return Err(Error::Conflict(format!(
                "Alert event with dedupe key '{}' already exists",
                key
            )));
        }

        let event = AlertEvent {
            id: Uuid::new_v4(),
            tenant_id: rule.tenant_id,
            device_id,
            rule_id: rule.id,
            severity: rule.severity,
            status: AlertStatus::Open,
            dedupe_key: Some(key),
            opened_at: Utc::now(),
            acknowledged_at: None,
            closed_at: None,
            details,
        };
        state.events.insert(event.id, event.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(event)
    }

    pub async fn get_event(&self, tenant_id: Option<Uuid>, event_id: Uuid) -> Result<AlertEvent> {
        let state = self.state.read().await;
        state
            .events
            .get(&event_id)
            .filter(|event| tenant_id.is_none_or(|t| event.tenant_id == t))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Alert event {} not found", event_id)))
    }

    pub async fn list_events(
        &self,
        tenant_id: Uuid,
        filter: AlertEventFilter,
    ) -> (Vec<AlertEvent>, usize) {
        let state = self.state.read().await;
        let mut events: Vec<AlertEvent> = state
            .events
            .values()
            .filter(|event| event.tenant_id == tenant_id)
            .filter(|event| filter.status.is_none_or(|s| event.status == s))
            .filter(|event| filter.severity.is_none_or(|s| event.severity == s))
            .filter(|event| filter.device_id.is_none_or(|d| event.device_id == d))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));

        let total = events.len();
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(100).clamp(1, 1000);
        let page = events.into_iter().skip(offset).take(limit).collect();
        (page, total)
    }

    /// OPEN -> ACKNOWLEDGED.
    pub async fn acknowledge_event(
        &self,
        tenant_id: Option<Uuid>,
        event_id: Uuid,
    ) -> Result<AlertEvent> {
        let mut state = self.state.write().await;
        let event = state
            .events
            .get_mut(&event_id)
            .filter(|event| tenant_id.is_none_or(|t| event.tenant_id == t))
            .ok_or_else(|| Error::NotFound(format!("Alert event {} not found", event_id)))?;
        if event.status != AlertStatus::Open {
            return Err(Error::Conflict(format!(
                "Alert event {} is not open",
                event_id
            )));
        }
        event.status = AlertStatus::Acknowledged;
        event.acknowledged_at = Some(Utc::now());

        let event = event.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(event)
    }

    /// OPEN | ACKNOWLEDGED -> CLOSED. Clears the dedupe key so the unique
    /// index never blocks a future re-open for the same pair.
    pub async fn close_event(
        &self,
        tenant_id: Option<Uuid>,
        event_id: Uuid,
    ) -> Result<AlertEvent> {
        let mut state = self.state.write().await;
        let event = state
            .events
            .get_mut(&event_id)
            .filter(|event| tenant_id.is_none_or(|t| event.tenant_id == t))
            .ok_or_else(|| Error::NotFound(format!("Alert event {} not found", event_id)))?;
        if !matches!(event.status, AlertStatus::Open | AlertStatus::Acknowledged) {
            return Err(Error::Conflict(format!(
                "Alert event {} is already closed",
                event_id
            )));
        }
        event.status = AlertStatus::Closed;
        event.closed_at = Some(Utc::now());
        event.dedupe_key = None;

        let event = event.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(event)
    }

    pub async fn open_counts_by_severity(&self, tenant_id: Uuid) -> HashMap<Severity, usize> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for event in state.events.values() {
            if event.tenant_id == tenant_id && event.status == AlertStatus::Open {
                *counts.entry(event.severity).or_insert(0) += 1;
            }
        }
        counts
    }
}

async fn load_state(path: &Path) -> Result<AlertState> {
    if !path.exists() {
        return Ok(AlertState::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(AlertState::default());
    }
    let stored: StoredAlertState = serde_json::from_str(&content)?;
    Ok(AlertState {
        rules: stored.rules.into_iter().map(|r| (r.id, r)).collect(),
        events: stored.events.into_iter().map(|e| (e.id, e)).collect(),
    })
}

async fn persist_state(path: &Path, state: &AlertState) -> Result<()> {
    let stored = StoredAlertState {
        rules: state.rules.values().cloned().collect(),
        events: state.events.values().cloned().collect(),
    };
    let content = serde_json::to_string_pretty(&stored)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
