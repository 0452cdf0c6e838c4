use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::{AuditListQuery, AuditRecord};

/// Append-only JSONL audit log. Writes are best-effort by contract: a
/// failed audit append never fails the surrounding domain operation.
pub struct AuditStore {
    events_path: PathBuf,
    events: RwLock<Vec<AuditRecord>>,
}

fn trim_to_none(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

impl AuditStore {
    pub async fn new(root_dir: PathBuf) -> std::io::Result<Self> {
        fs::create_dir_all(&root_dir).await?;
        let events_path = root_dir.join("audit.jsonl");

        if fs::metadata(&events_path).await.is_err() {
            fs::File::create(&events_path).await?;
        }

        let events = Self::load_events(&events_path).await?;
        Ok(Self {
            events_path,
            events: RwLock::new(events),
        })
    }

    async fn load_events(path: &Path) -> std::io::Result<Vec<AuditRecord>> {
        let file = fs::File::open(path).await?;
        let mut reader = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = reader.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<AuditRecord>(&line) {
                Ok(event) => events.push(event),
                Err(err) => warn!(
                    "Ignoring malformed audit record in {}: {}",
                    path.display(),
                    err
                ),
            }
        }

        Ok(events)
    }

    async fn append(&self, record: AuditRecord) -> Result<(), String> {
        let encoded = serde_json::to_string(&record)
            .map_err(|err| format!("Failed to encode audit record: {}", err))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .map_err(|err| format!("Failed to open audit log: {}", err))?;

        file.write_all(encoded.as_bytes())
            .await
            .map_err(|err| format!("Failed to write audit log: {}", err))?;
        file.write_all(b"\n")
            .await
            .map_err(|err| format!("Failed to finalize audit log line: {}", err))?;
        file.flush()
            .await
            .map_err(|err| format!("Failed to flush audit log: {}", err))?;

        let mut state = self.events.write().await;
        state.push(record);
        Ok(())
    }

    /// Append, swallowing failures. Domain handlers call this.
    pub async fn record(&self, record: AuditRecord) {
        if let Err(err) = self.append(record).await {
            warn!("Audit write failed, continuing: {}", err);
        }
    }

    /// Newest first, tenant-filtered for non-platform callers by passing
    /// their tenant in the query.
    pub async fn list_paginated(&self, query: &AuditListQuery) -> (Vec<AuditRecord>, bool) {
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(100).clamp(1, 1000);
        let action_filter = trim_to_none(query.action.clone()).map(|value| value.to_lowercase());
        let entity_type_filter = trim_to_none(query.entity_type.clone());
        let entity_id_filter = trim_to_none(query.entity_id.clone());

        let state = self.events.read().await;
        let mut matched = 0usize;
        let mut events = Vec::with_capacity(limit);

        for event in state.iter().rev() {
            if let Some(tenant_id) = query.tenant_id {
                if event.tenant_id != Some(tenant_id) {
                    continue;
                }
            }

            if let Some(action) = action_filter.as_deref() {
                if !event.action.to_lowercase().contains(action) {
                    continue;
                }
            }

            if let Some(entity_type) = entity_type_filter.as_deref() {
                if event.entity_type != entity_type {
                    continue;
                }
            }

            if let Some(entity_id) = entity_id_filter.as_deref() {
                if event.entity_id != entity_id {
                    continue;
                }
            }

            if matched < offset {
                matched += 1;
                continue;
            }

            if events.len() < limit {
                events.push(event.clone());
            }
            matched += 1;
        }

        let has_more = matched > offset + events.len();
        (events, has_more)
    }

    /// True when any record matches the tenant + action pair. Test helper
    /// for the device-geo audit scenarios.
    pub async fn has_action(&self, tenant_id: Uuid, action: &str) -> bool {
        let state = self.events.read().await;
        state
            .iter()
            .any(|event| event.tenant_id == Some(tenant_id) && event.action == action)
    }
}
