//! File-backed entitlements
//!
//! Rows are unique on (tenant, key, device). Resolution: a device-scoped
//! row wins, then a tenant-scoped row, then the key's default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{Error, Result};

use super::model::*;

#[derive(Debug, Default)]
struct EntitlementState {
    entitlements: HashMap<Uuid, Entitlement>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredEntitlementState {
    entitlements: Vec<Entitlement>,
}

pub struct EntitlementStore {
    state: RwLock<EntitlementState>,
    file_path: PathBuf,
}

impl EntitlementStore {
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        let file_path = data_dir.join("entitlements.json");
        let state = load_state(&file_path).await?;
        Ok(Self {
            state: RwLock::new(state),
            file_path,
        })
    }

    pub async fn upsert(&self, tenant_id: Uuid, upsert: EntitlementUpsert) -> Result<Entitlement> {
        match upsert.scope {
            EntitlementScope::Device if upsert.device_id.is_none() => {
                return Err(Error::InvalidInput(
                    "DEVICE scope requires a deviceId".to_string(),
                ));
            }
            EntitlementScope::Tenant if upsert.device_id.is_some() => {
                return Err(Error::InvalidInput(
                    "TENANT scope must not carry a deviceId".to_string(),
                ));
            }
            _ => {}
        }

        let now = Utc::now();
        let mut state = self.state.write().await;
        let existing = state.entitlements.values_mut().find(|row| {
            row.tenant_id == tenant_id && row.key == upsert.key && row.device_id == upsert.device_id
        });
        let entitlement = if let Some(row) = existing {
            row.enabled = upsert.enabled;
            row.updated_at = now;
            row.clone()
        } else {
            let row = Entitlement {
                id: Uuid::new_v4(),
                tenant_id,
                scope: upsert.scope,
                device_id: upsert.device_id,
                key: upsert.key,
                enabled: upsert.enabled,
                created_at: now,
                updated_at: now,
            };
            state.entitlements.insert(row.id, row.clone());
            row
        };
        persist_state(&self.file_path, &state).await?;
        Ok(entitlement)
    }

    pub async fn list(&self, tenant_id: Uuid) -> Vec<Entitlement> {
        let state = self.state.read().await;
        let mut rows: Vec<Entitlement> = state
            .entitlements
            .values()
            .filter(|row| row.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rows
    }

    /// Deterministic resolution over stored rows plus the default table.
    pub async fn resolve(
        &self,
        tenant_id: Uuid,
        key: EntitlementKey,
        device_id: Option<Uuid>,
    ) -> bool {
        let state = self.state.read().await;
        if let Some(device_id) = device_id {
            if let Some(row) = state.entitlements.values().find(|row| {
                row.tenant_id == tenant_id && row.key == key && row.device_id == Some(device_id)
            }) {
                return row.enabled;
            }
        }
        if let Some(row) = state
            .entitlements
            .values()
            .find(|row| row.tenant_id == tenant_id && row.key == key && row.device_id.is_none())
        {
            return row.enabled;
        }
        key.default_enabled()
    }
}

async fn load_state(path: &Path) -> Result<EntitlementState> {
    if !path.exists() {
        return Ok(EntitlementState::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(EntitlementState::default());
    }
    let stored: StoredEntitlementState = serde_json::from_str(&content)?;
    Ok(EntitlementState {
        entitlements: stored.entitlements.into_iter().map(|e| (e.id, e)).collect(),
    })
}

async fn persist_state(path: &Path, state: &EntitlementState) -> Result<()> {
    let stored = StoredEntitlementState {
        entitlements: state.entitlements.values().cloned().collect(),
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
    use tempfile::TempDir;

    use super::*;

    async fn build_store() -> (EntitlementStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = EntitlementStore::new(temp_dir.path().join("data"))
            .await
            .unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn defaults_apply_without_rows() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        assert!(
            store
                .resolve(tenant, EntitlementKey::BasicRemoteBoost, None)
                .await
        );
        assert!(
            !store
                .resolve(tenant, EntitlementKey::SmartHomeIntegration, None)
                .await
        );
    }

    #[tokio::test]
    async fn device_row_wins_over_tenant_row() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        let device = Uuid::new_v4();

        store
            .upsert(
                tenant,
                EntitlementUpsert {
                    scope: EntitlementScope::Tenant,
                    device_id: None,
                    key: EntitlementKey::BasicRemoteBoost,
                    enabled: true,
                },
            )
            .await
            .unwrap();
        store
            .upsert(
                tenant,
                EntitlementUpsert {
                    scope: EntitlementScope::Device,
                    device_id: Some(device),
                    key: EntitlementKey::BasicRemoteBoost,
                    enabled: false,
                },
            )
            .await
            .unwrap();

        assert!(
            !store
                .resolve(tenant, EntitlementKey::BasicRemoteBoost, Some(device))
                .await
        );
        // other devices still see the tenant row
        assert!(
            store
                .resolve(tenant, EntitlementKey::BasicRemoteBoost, Some(Uuid::new_v4()))
                .await
        );
    }

    #[tokio::test]
    async fn tenant_row_disables_a_default_on_key() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        store
            .upsert(
                tenant,
                EntitlementUpsert {
                    scope: EntitlementScope::Tenant,
                    device_id: None,
                    key: EntitlementKey::BasicRemoteBoost,
                    enabled: false,
                },
            )
            .await
            .unwrap();
        assert!(
            !store
                .resolve(tenant, EntitlementKey::BasicRemoteBoost, None)
                .await
        );
        // another tenant is unaffected
        assert!(
            store
                .resolve(Uuid::new_v4(), EntitlementKey::BasicRemoteBoost, None)
                .await
        );
    }

    #[tokio::test]
    async fn upsert_replaces_the_matching_row() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        let first = store
            .upsert(
                tenant,
                EntitlementUpsert {
                    scope: EntitlementScope::Tenant,
                    device_id: None,
                    key: EntitlementKey::SmartHomeIntegration,
                    enabled: true,
                },
            )
            .await
            .unwrap();
        let second = store
            .upsert(
                tenant,
                EntitlementUpsert {
                    scope: EntitlementScope::Tenant,
                    device_id: None,
                    key: EntitlementKey::SmartHomeIntegration,
                    enabled: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.list(tenant).await.len(), 1);
    }

    #[tokio::test]
    async fn scope_and_device_id_must_agree() {
        let (store, _temp_dir) = build_store().await;
        let tenant = Uuid::new_v4();
        let err = store
            .upsert(
                tenant,
                EntitlementUpsert {
                    scope: EntitlementScope::Device,
                    device_id: None,
                    key: EntitlementKey::BasicRemoteBoost,
                    enabled: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
