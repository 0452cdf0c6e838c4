//! File-backed notification channels and outbound queue
//!
//! Suppression is by severity and channel type: WEBHOOK channels receive
//! every severity, EMAIL and SMS only WARNING and CRITICAL.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::alert::{AlertEvent, Severity};
use crate::{Error, Result};

use super::model::*;

#[derive(Debug, Default)]
struct NotifyState {
    channels: HashMap<Uuid, NotificationChannel>,
    events: HashMap<Uuid, NotificationEvent>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredNotifyState {
    channels: Vec<NotificationChannel>,
    events: Vec<NotificationEvent>,
}

pub struct NotifyStore {
    state: RwLock<NotifyState>,
    file_path: PathBuf,
}

impl NotifyStore {
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        let file_path = data_dir.join("notifications.json");
        let state = load_state(&file_path).await?;
        Ok(Self {
            state: RwLock::new(state),
            file_path,
        })
    }

    // --- channels ---

    pub async fn create_channel(
        &self,
        tenant_id: Uuid,
        new: NewNotificationChannel,
    ) -> Result<NotificationChannel> {
        let now = Utc::now();
        let channel = NotificationChannel {
            id: Uuid::new_v4(),
            tenant_id,
            channel_type: new.channel_type,
            config: new.config,
            enabled: new.enabled,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.channels.insert(channel.id, channel.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(channel)
    }

    pub async fn list_channels(&self, tenant_id: Uuid) -> Vec<NotificationChannel> {
        let state = self.state.read().await;
        let mut channels: Vec<NotificationChannel> = state
            .channels
            .values()
            .filter(|channel| channel.tenant_id == tenant_id)
            .cloned()
            .collect();
        channels.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        channels
    }

    // --- queue ---

    /// Producer side: enqueue one event per enabled tenant channel that
    /// accepts the alert's severity.
    pub async fn enqueue_for_alert(
        &self,
        alert: &AlertEvent,
        payload: Value,
    ) -> Result<Vec<NotificationEvent>> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let recipients: Vec<(Uuid, ChannelType)> = state
            .channels
            .values()
            .filter(|channel| channel.tenant_id == alert.tenant_id && channel.enabled)
            .filter(|channel| channel_accepts(channel.channel_type, alert.severity))
            .map(|channel| (channel.id, channel.channel_type))
            .collect();

        let mut queued = Vec::with_capacity(recipients.len());
        for (channel_id, channel_type) in recipients {
            let event = NotificationEvent {
                id: Uuid::new_v4(),
                tenant_id: alert.tenant_id,
                channel_id,
                channel_type,
                alert_event_id: Some(alert.id),
                status: NotificationStatus::Queued,
                payload: payload.clone(),
                queued_at: now,
                sent_at: None,
                error_msg: None,
            };
            state.events.insert(event.id, event.clone());
            queued.push(event);
        }
        if !queued.is_empty() {
            persist_state(&self.file_path, &state).await?;
        }
        Ok(queued)
    }

    /// Consumer side: up to `limit` QUEUED events, oldest first.
    pub async fn queued_events(&self, limit: usize) -> Vec<NotificationEvent> {
        let state = self.state.read().await;
        let mut events: Vec<NotificationEvent> = state
            .events
            .values()
            .filter(|event| event.status == NotificationStatus::Queued)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.queued_at.cmp(&b.queued_at));
        events.truncate(limit);
        events
    }

    pub async fn channel(&self, channel_id: Uuid) -> Result<NotificationChannel> {
        let state = self.state.read().await;
        state
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Channel {} not found", channel_id)))
    }

    pub async fn mark_sent(&self, event_id: Uuid) -> Result<NotificationEvent> {
        self.finish(event_id, NotificationStatus::Sent, None).await
    }

    pub async fn mark_failed(&self, event_id: Uuid, error_msg: String) -> Result<NotificationEvent> {
        self.finish(event_id, NotificationStatus::Failed, Some(error_msg))
            .await
    }

    async fn finish(
        &self,
        event_id: Uuid,
        status: NotificationStatus,
        error_msg: Option<String>,
    ) -> Result<NotificationEvent> {
        let mut state = self.state.write().await;
        let event = state
            .events
            .get_mut(&event_id)
            .ok_or_else(|| Error::NotFound(format!("Notification {} not found", event_id)))?;
        event.status = status;
        event.error_msg = error_msg;
        if status == NotificationStatus::Sent {
            event.sent_at = Some(Utc::now());
        }

        let event = event.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(event)
    }

    pub async fn list_events(&self, tenant_id: Uuid) -> Vec<NotificationEvent> {
        let state = self.state.read().await;
        let mut events: Vec<NotificationEvent> = state
            .events
            .values()
            .filter(|event| event.tenant_id == tenant_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        events
    }
}

/// WEBHOOK gets everything; EMAIL/SMS drop INFO.
fn channel_accepts(channel_type: ChannelType, severity: Severity) -> bool {
    channel_type == ChannelType::Webhook || severity != Severity::Info
}

async fn load_state(path: &Path) -> Result<NotifyState> {
    if !path.exists() {
        return Ok(NotifyState::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(NotifyState::default());
    }
    let stored: StoredNotifyState = serde_json::from_str(&content)?;
    Ok(NotifyState {
        channels: stored.channels.into_iter().map(|c| (c.id, c)).collect(),
        events: stored.events.into_iter().map(|e| (e.id, e)).collect(),
    })
}

async fn persist_state(path: &Path, state: &NotifyState) -> Result<()> {
    let stored = StoredNotifyState {
        channels: state.channels.values().cloned().collect(),
        events: state.events.values().cloned().collect(),
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
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::alert::AlertStatus;

    use super::*;

    async fn build_store() -> (NotifyStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = NotifyStore::new(temp_dir.path().join("data")).await.unwrap();
        (store, temp_dir)
    }

    fn alert(tenant: Uuid, severity: Severity) -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            device_id: Uuid::new_v4(),
            rule_id: Uuid::new_v4(),
            severity,
            status: AlertStatus::Open,
            dedupe_key: None,
            opened_at: Utc::now(),
            acknowledged_at: None,
            closed_at: None,
            details: json!({}),
        }
    }

    async fn seed_channel(
        store: &NotifyStore,
        tenant: Uuid,
        channel_type: ChannelType,
    ) -> NotificationChannel {
        store
            .create_channel(
                tenant,
                NewNotificationChannel {
                    channel_type,
                    config: json!({}),
                    enabled: true,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn info_severity_reaches_webhook_only() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        seed_channel(&store, tenant, ChannelType::Email).await;
        seed_channel(&store, tenant, ChannelType::Sms).await;
        let webhook = seed_channel(&store, tenant, ChannelType::Webhook).await;

        let queued = store
            .enqueue_for_alert(&alert(tenant, Severity::Info), json!({"msg": "info"}))
            .await
            .unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].channel_id, webhook.id);
    }

    #[tokio::test]
    async fn warning_severity_reaches_every_channel_type() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        seed_channel(&store, tenant, ChannelType::Email).await;
        seed_channel(&store, tenant, ChannelType::Sms).await;
        seed_channel(&store, tenant, ChannelType::Webhook).await;

        let queued = store
            .enqueue_for_alert(&alert(tenant, Severity::Warning), json!({}))
            .await
            .unwrap();
        assert_eq!(queued.len(), 3);
    }

    #[tokio::test]
    async fn disabled_and_foreign_channels_are_skipped() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        store
            .create_channel(
                tenant,
                NewNotificationChannel {
                    channel_type: ChannelType::Webhook,
                    config: json!({}),
                    enabled: false,
                },
            )
            .await
            .unwrap();
        seed_channel(&store, Uuid::new_v4(), ChannelType::Webhook).await;

        let queued = store
            .enqueue_for_alert(&alert(tenant, Severity::Critical), json!({}))
            .await
            .unwrap();
        assert!(queued.is_empty());
    }

    #[tokio::test]
    async fn drain_is_oldest_first_and_terminal() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        seed_channel(&store, tenant, ChannelType::Webhook).await;

        let first = store
            .enqueue_for_alert(&alert(tenant, Severity::Warning), json!({"n": 1}))
            .await
            .unwrap();
        let second = store
            .enqueue_for_alert(&alert(tenant, Severity::Warning), json!({"n": 2}))
            .await
            .unwrap();

        let queued = store.queued_events(100).await;
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].id, first[0].id);

        store.mark_sent(first[0].id).await.unwrap();
        store
            .mark_failed(second[0].id, "connection refused".to_string())
            .await
            .unwrap();
        assert!(store.queued_events(100).await.is_empty());

        let events = store.list_events(tenant).await;
        assert!(events.iter().any(|e| e.status == NotificationStatus::Sent
            && e.sent_at.is_some()));
        assert!(events
            .iter()
            .any(|e| e.status == NotificationStatus::Failed
                && e.error_msg.as_deref() == Some("connection refused")));
    }
}
