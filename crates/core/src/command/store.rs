//! File-backed command queue
//!
//! Per-device state machine: QUEUED -> DELIVERED -> ACKED | FAILED. Polling
//! marks rows DELIVERED before they are returned, under the write lock, so a
//! duplicate poll never resurfaces them.

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
struct CommandState {
    commands: HashMap<Uuid, Command>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCommandState {
    commands: Vec<Command>,
}

pub struct CommandStore {
    state: RwLock<CommandState>,
    file_path: PathBuf,
}

impl CommandStore {
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        let file_path = data_dir.join("commands.json");
        let state = load_state(&file_path).await?;
        Ok(Self {
            state: RwLock::new(state),
            file_path,
        })
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        device_id: Uuid,
        command_type: CommandType,
        payload: Value,
        requested_by_user_id: Uuid,
    ) -> Result<Command> {
        let command = Command {
            id: Uuid::new_v4(),
            tenant_id,
            device_id,
            command_type,
            payload,
            requested_by_user_id,
            status: CommandStatus::Queued,
            requested_at: Utc::now(),
            delivered_at: None,
            ack_at: None,
            error_msg: None,
        };

        let mut state = self.state.write().await;
        state.commands.insert(command.id, command.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(command)
    }

    pub async fn get(&self, tenant_id: Option<Uuid>, command_id: Uuid) -> Result<Command> {
        let state = self.state.read().await;
        state
            .commands
            .get(&command_id)
            .filter(|command| tenant_id.is_none_or(|t| command.tenant_id == t))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Command {} not found", command_id)))
    }

    pub async fn list_for_device(&self, tenant_id: Uuid, device_id: Uuid) -> Vec<Command> {
        let state = self.state.read().await;
        let mut commands: Vec<Command> = state
            .commands
            .values()
            .filter(|command| command.tenant_id == tenant_id && command.device_id == device_id)
            .cloned()
            .collect();
        commands.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        commands
    }

    /// Deliver the device's queued commands: select QUEUED rows ordered by
    /// `requested_at` ascending and flip them to DELIVERED before returning.
    pub async fn poll_pending(&self, device_id: Uuid) -> Result<Vec<Command>> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut delivered: Vec<Command> = Vec::new();
        for command in state.commands.values_mut() {
            if command.device_id == device_id && command.status == CommandStatus::Queued {
                command.status = CommandStatus::Delivered;
                command.delivered_at = Some(now);
                delivered.push(command.clone());
            }
        }
        if !delivered.is_empty() {
            persist_state(&self.file_path, &state).await?;
        }
        delivered.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(delivered)
    }

    /// Device acknowledgement. Only a DELIVERED command may move to a
    /// terminal state; acking a row the device never polled is a conflict.
    pub async fn acknowledge(
        &self,
        device_id: Uuid,
        command_id: Uuid,
        ack: CommandAckStatus,
        error_msg: Option<String>,
    ) -> Result<Command> {
        let mut state = self.state.write().await;
        let command = state
            .commands
            .get_mut(&command_id)
            .filter(|command| command.device_id == device_id)
            .ok_or_else(|| Error::NotFound(format!("Command {} not found", command_id)))?;
        if command.status != CommandStatus::Delivered {
            return Err(Error::Conflict(format!(
                "Command {} has not been delivered",
                command_id
            )));
        }

        command.status = match ack {
            CommandAckStatus::Acked => CommandStatus::Acked,
            CommandAckStatus::Failed => CommandStatus::Failed,
        };
        command.ack_at = Some(Utc::now());
        command.error_msg = error_msg;

        let command = command.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(command)
    }

    pub async fn queued_count(&self, tenant_id: Uuid) -> usize {
        let state = self.state.read().await;
        state
            .commands
            .values()
            .filter(|command| {
                command.tenant_id == tenant_id && command.status == CommandStatus::Queued
            })
            .count()
    }
}

async fn load_state(path: &Path) -> Result<CommandState> {
    if !path.exists() {
        return Ok(CommandState::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(CommandState::default());
    }
    let stored: StoredCommandState = serde_json::from_str(&content)?;
    Ok(CommandState {
        commands: stored.commands.into_iter().map(|c| (c.id, c)).collect(),
    })
}

async fn persist_state(path: &Path, state: &CommandState) -> Result<()> {
    let stored = StoredCommandState {
        commands: state.commands.values().cloned().collect(),
    };
    let content = serde_json::to_string_pretty(&stored)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    async fn build_store() -> (CommandStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = CommandStore::new(temp_dir.path().join("data")).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn poll_delivers_in_request_order_and_only_once() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        let device = Uuid::new_v4();
        let user = Uuid::new_v4();

        let first = store
            .create(tenant, device, CommandType::RemoteBoostSet, json!({"on": true}), user)
            .await
            .unwrap();
        let second = store
            .create(tenant, device, CommandType::SetConfig, json!({"mode": "eco"}), user)
            .await
            .unwrap();

        let delivered = store.poll_pending(device).await.unwrap();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].id, first.id);
        assert_eq!(delivered[1].id, second.id);
        assert!(delivered.iter().all(|c| c.status == CommandStatus::Delivered));
        assert!(delivered.iter().all(|c| c.delivered_at.is_some()));

        // a second poll must not resurface the rows
        let again = store.poll_pending(device).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn poll_skips_other_devices() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        let device = Uuid::new_v4();
        let other = Uuid::new_v4();
        let user = Uuid::new_v4();

        store
            .create(tenant, device, CommandType::SetSchedule, json!({}), user)
            .await
            .unwrap();

        assert!(store.poll_pending(other).await.unwrap().is_empty());
        assert_eq!(store.poll_pending(device).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn acknowledge_sets_terminal_status() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        let device = Uuid::new_v4();
        let user = Uuid::new_v4();

        let command = store
            .create(tenant, device, CommandType::RemoteBoostSet, json!({}), user)
            .await
            .unwrap();
        store.poll_pending(device).await.unwrap();

        let acked = store
            .acknowledge(device, command.id, CommandAckStatus::Acked, None)
            .await
            .unwrap();
        assert_eq!(acked.status, CommandStatus::Acked);
        assert!(acked.ack_at.is_some());

        // ack from the wrong device identity is a 404
        let err = store
            .acknowledge(Uuid::new_v4(), command.id, CommandAckStatus::Acked, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn ack_requires_prior_delivery() {
        let (store, _temp_dir) = build_store().await;
        let device = Uuid::new_v4();
        let command = store
            .create(
                Uuid::new_v4(),
                device,
                CommandType::RemoteBoostSet,
                json!({}),
                Uuid::new_v4(),
            )
            .await
            .unwrap();

        // never polled, still QUEUED: the ack must not shortcut the state machine
        let err = store
            .acknowledge(device, command.id, CommandAckStatus::Acked, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        let still_queued = store.get(None, command.id).await.unwrap();
        assert_eq!(still_queued.status, CommandStatus::Queued);

        store.poll_pending(device).await.unwrap();
        store
            .acknowledge(device, command.id, CommandAckStatus::Acked, None)
            .await
            .unwrap();

        // a second ack on the terminal row is rejected too
        let err = store
            .acknowledge(device, command.id, CommandAckStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_ack_records_error_message() {
        let (store, _temp_dir) = build_store().await;
        let device = Uuid::new_v4();
        let command = store
            .create(Uuid::new_v4(), device, CommandType::SetConfig, json!({}), Uuid::new_v4())
            .await
            .unwrap();
        store.poll_pending(device).await.unwrap();

        let failed = store
            .acknowledge(
                device,
                command.id,
                CommandAckStatus::Failed,
                Some("unsupported config key".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(failed.status, CommandStatus::Failed);
        assert_eq!(failed.error_msg.as_deref(), Some("unsupported config key"));
    }
}
