//! File-backed identity state: tenants, users and memberships

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantType {
    Manufacturer,
    Retailer,
    Installer,
    PropertyManager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    Active,
    Suspended,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Invited,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    PlatformAdmin,
    TenantAdmin,
    Installer,
    SupportAgent,
    EndUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub tenant_type: TenantType,
    pub status: TenantStatus,
    #[serde(default)]
    pub settings: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    status: UserStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

/// Membership joined with its tenant, as returned by login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipInfo {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub role: Role,
}

/// A verified user plus everything the tenancy guard needs.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user: UserSummary,
    pub memberships: Vec<Membership>,
}

impl AuthedUser {
    pub fn is_platform_admin(&self) -> bool {
        self.memberships
            .iter()
            .any(|membership| membership.role == Role::PlatformAdmin)
    }

    pub fn role_in(&self, tenant_id: Uuid) -> Option<Role> {
        self.memberships
            .iter()
            .find(|membership| membership.tenant_id == tenant_id)
            .map(|membership| membership.role)
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Default)]
struct IdentityState {
    tenants: HashMap<Uuid, Tenant>,
    users: HashMap<Uuid, User>,
    memberships: HashMap<Uuid, Membership>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredIdentityState {
    tenants: Vec<Tenant>,
    users: Vec<User>,
    memberships: Vec<Membership>,
}

impl From<StoredIdentityState> for IdentityState {
    fn from(value: StoredIdentityState) -> Self {
        Self {
            tenants: value.tenants.into_iter().map(|t| (t.id, t)).collect(),
            users: value.users.into_iter().map(|u| (u.id, u)).collect(),
            memberships: value.memberships.into_iter().map(|m| (m.id, m)).collect(),
        }
    }
}

impl From<&IdentityState> for StoredIdentityState {
    fn from(value: &IdentityState) -> Self {
        Self {
            tenants: value.tenants.values().cloned().collect(),
            users: value.users.values().cloned().collect(),
            memberships: value.memberships.values().cloned().collect(),
        }
    }
}

pub struct IdentityStore {
    state: RwLock<IdentityState>,
    file_path: PathBuf,
}

impl IdentityStore {
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self, IdentityError> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await.map_err(|err| {
            IdentityError::Storage(format!("Failed to create identity directory: {}", err))
        })?;
        let file_path = data_dir.join("identity.json");
        let state = load_state(&file_path).await?;
        Ok(Self {
            state: RwLock::new(state),
            file_path,
        })
    }

    /// Self-service registration. The very first user bootstraps the
    /// deployment: it receives a platform tenant with PLATFORM_ADMIN.
    pub async fn register_user(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<(UserSummary, Vec<MembershipInfo>), IdentityError> {
        let normalized_email = normalize_email(email)?;
        validate_password(password)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(IdentityError::InvalidInput(
                "Name cannot be empty".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|user| user.email == normalized_email)
        {
            return Err(IdentityError::Conflict(format!(
                "User '{}' already exists",
                normalized_email
            )));
        }

        let now = Utc::now();
        let bootstrap = state.users.is_empty();
        let user = User {
            id: Uuid::new_v4(),
            email: normalized_email,
            name: name.to_string(),
            password_hash: hash_password(password),
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());

        if bootstrap {
            let tenant = Tenant {
                id: Uuid::new_v4(),
                name: "Platform".to_string(),
                tenant_type: TenantType::Manufacturer,
                status: TenantStatus::Active,
                settings: Value::Null,
                created_at: now,
                updated_at: now,
            };
            let membership = Membership {
                id: Uuid::new_v4(),
                user_id: user.id,
                tenant_id: tenant.id,
                role: Role::PlatformAdmin,
                created_at: now,
                updated_at: now,
            };
            state.tenants.insert(tenant.id, tenant);
            state.memberships.insert(membership.id, membership);
        }

        persist_state(&self.file_path, &state).await?;
        let memberships = memberships_info(&state, user.id);
        Ok((user_to_summary(&user), memberships))
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(UserSummary, Vec<MembershipInfo>), IdentityError> {
        let normalized_email = normalize_email(email)?;
        let state = self.state.read().await;
        let user = state
            .users
            .values()
            .find(|user| user.email == normalized_email)
            .ok_or_else(|| IdentityError::Unauthorized("Invalid credentials".to_string()))?;
        if user.status == UserStatus::Suspended || !verify_password(&user.password_hash, password) {
            return Err(IdentityError::Unauthorized(
                "Invalid credentials".to_string(),
            ));
        }
        Ok((user_to_summary(user), memberships_info(&state, user.id)))
    }

    /// Load the verified user behind a bearer token.
    pub async fn session(&self, user_id: Uuid) -> Result<AuthedUser, IdentityError> {
        let state = self.state.read().await;
        let user = state
            .users
            .get(&user_id)
            .ok_or_else(|| IdentityError::Unauthorized("User not found".to_string()))?;
        if user.status == UserStatus::Suspended {
            return Err(IdentityError::Unauthorized("User suspended".to_string()));
        }
        let memberships = state
            .memberships
            .values()
            .filter(|membership| membership.user_id == user_id)
            .cloned()
            .collect();
        Ok(AuthedUser {
            user: user_to_summary(user),
            memberships,
        })
    }

    pub async fn create_tenant(
        &self,
        name: &str,
        tenant_type: TenantType,
    ) -> Result<Tenant, IdentityError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IdentityError::InvalidInput(
                "Tenant name cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            tenant_type,
            status: TenantStatus::Active,
            settings: Value::Null,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.tenants.insert(tenant.id, tenant.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(tenant)
    }

    pub async fn get_tenant(&self, tenant_id: Uuid) -> Result<Tenant, IdentityError> {
        let state = self.state.read().await;
        state
            .tenants
            .get(&tenant_id)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(format!("Tenant {} not found", tenant_id)))
    }

    /// Tenants the caller can see: all of them for platform admins, their
    /// membership tenants otherwise.
    pub async fn list_tenants_for(&self, user: &AuthedUser) -> Vec<Tenant> {
        let state = self.state.read().await;
        let mut tenants: Vec<Tenant> = if user.is_platform_admin() {
            state.tenants.values().cloned().collect()
        } else {
            user.memberships
                .iter()
                .filter_map(|membership| state.tenants.get(&membership.tenant_id))
                .cloned()
                .collect()
        };
        tenants.sort_by(|a, b| a.name.cmp(&b.name));
        tenants
    }

    /// Invite a user into a tenant, creating the account if the email is
    /// new. A membership already present is a conflict; use the role
    /// update for changes.
    pub async fn invite_user(
        &self,
        tenant_id: Uuid,
        email: &str,
        name: &str,
        role: Role,
        password: Option<&str>,
    ) -> Result<(UserSummary, Membership), IdentityError> {
        let normalized_email = normalize_email(email)?;
        if let Some(password) = password {
            validate_password(password)?;
        }

        let mut state = self.state.write().await;
        if !state.tenants.contains_key(&tenant_id) {
            return Err(IdentityError::NotFound(format!(
                "Tenant {} not found",
                tenant_id
            )));
        }

        let now = Utc::now();
        let user = match state
            .users
            .values()
            .find(|user| user.email == normalized_email)
            .cloned()
        {
            Some(user) => user,
            None => {
                let password_hash = match password {
                    Some(password) => hash_password(password),
                    None => hash_password(&generated_invite_password()),
                };
                let user = User {
                    id: Uuid::new_v4(),
                    email: normalized_email,
                    name: name.trim().to_string(),
                    password_hash,
                    status: if password.is_some() {
                        UserStatus::Active
                    } else {
                        UserStatus::Invited
                    },
                    created_at: now,
                    updated_at: now,
                };
                state.users.insert(user.id, user.clone());
                user
            }
        };

        if state
            .memberships
            .values()
            .any(|m| m.user_id == user.id && m.tenant_id == tenant_id)
        {
            return Err(IdentityError::Conflict(
                "User is already a member of this tenant".to_string(),
            ));
        }

        let membership = Membership {
            id: Uuid::new_v4(),
            user_id: user.id,
            tenant_id,
            role,
            created_at: now,
            updated_at: now,
        };
        state.memberships.insert(membership.id, membership.clone());
        persist_state(&self.file_path, &state).await?;
        Ok((user_to_summary(&user), membership))
    }

    pub async fn update_member_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership, IdentityError> {
        let mut state = self.state.write().await;
        let membership = state
            .memberships
            .values_mut()
            .find(|m| m.user_id == user_id && m.tenant_id == tenant_id)
            .ok_or_else(|| {
                IdentityError::NotFound("Membership not found in tenant".to_string())
            })?;
        membership.role = role;
        membership.updated_at = Utc::now();

        let membership = membership.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(membership)
    }
}

fn user_to_summary(user: &User) -> UserSummary {
    UserSummary {
        id: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        status: user.status,
        created_at: user.created_at,
    }
}

fn memberships_info(state: &IdentityState, user_id: Uuid) -> Vec<MembershipInfo> {
    let mut infos: Vec<MembershipInfo> = state
        .memberships
        .values()
        .filter(|membership| membership.user_id == user_id)
        .filter_map(|membership| {
            state
                .tenants
                .get(&membership.tenant_id)
                .map(|tenant| MembershipInfo {
                    tenant_id: tenant.id,
                    tenant_name: tenant.name.clone(),
                    role: membership.role,
                })
        })
        .collect();
    infos.sort_by(|a, b| a.tenant_name.cmp(&b.tenant_name));
    infos
}

async fn load_state(path: &Path) -> Result<IdentityState, IdentityError> {
    if !path.exists() {
        return Ok(IdentityState::default());
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| IdentityError::Storage(format!("Failed to read identity state: {}", err)))?;
    if content.trim().is_empty() {
        return Ok(IdentityState::default());
    }
    let stored: StoredIdentityState = serde_json::from_str(&content)
        .map_err(|err| IdentityError::Storage(format!("Failed to parse identity state: {}", err)))?;
    Ok(stored.into())
}

async fn persist_state(path: &Path, state: &IdentityState) -> Result<(), IdentityError> {
    let content = serde_json::to_string_pretty(&StoredIdentityState::from(state)).map_err(
        |err| IdentityError::Storage(format!("Failed to serialize identity state: {}", err)),
    )?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|err| {
            IdentityError::Storage(format!("Failed to create identity parent dir: {}", err))
        })?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|err| IdentityError::Storage(format!("Failed to write identity state: {}", err)))
}

fn normalize_email(email: &str) -> Result<String, IdentityError> {
    let email = email.trim().to_lowercase();
    match email.find('@') {
        Some(at) if at > 0 && at < email.len() - 1 => Ok(email),
        _ => Err(IdentityError::InvalidInput("Invalid email".to_string())),
    }
}

fn validate_password(password: &str) -> Result<(), IdentityError> {
    if password.len() < 8 {
        return Err(IdentityError::InvalidInput(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

fn generated_invite_password() -> String {
    let mut bytes = [0_u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

// Stored credentials are `sha256$<salt>$<digest>` with both parts
// base64url-encoded and the digest computed over salt || password.
const PASSWORD_SCHEME: &str = "sha256";
const PASSWORD_SALT_LEN: usize = 16;

fn salted_digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

fn hash_password(password: &str) -> String {
    let mut salt = [0_u8; PASSWORD_SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    format!(
        "{}${}${}",
        PASSWORD_SCHEME,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(salted_digest(&salt, password))
    )
}

fn verify_password(stored: &str, password: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(salt), Some(digest)) if scheme == PASSWORD_SCHEME => {
            match (URL_SAFE_NO_PAD.decode(salt), URL_SAFE_NO_PAD.decode(digest)) {
                (Ok(salt), Ok(expected)) => salted_digest(&salt, password).as_slice() == expected,
                _ => false,
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn build_store() -> (IdentityStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = IdentityStore::new(temp_dir.path().join("data"))
            .await
            .unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn first_registration_bootstraps_platform_admin() {
        let (store, _temp_dir) = build_store().await;
        let (user, memberships) = store
            .register_user("root@example.com", "verysecurepw", "Root")
            .await
            .unwrap();
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].role, Role::PlatformAdmin);

        let session = store.session(user.id).await.unwrap();
        assert!(session.is_platform_admin());

        // second registration is a plain user
        let (_, memberships) = store
            .register_user("user@example.com", "verysecurepw", "User")
            .await
            .unwrap();
        assert!(memberships.is_empty());
    }

    #[test]
    fn password_hashes_are_salted_and_tagged() {
        let first = hash_password("verysecurepw");
        let second = hash_password("verysecurepw");
        assert_ne!(first, second);
        assert!(first.starts_with("sha256$"));

        assert!(verify_password(&first, "verysecurepw"));
        assert!(verify_password(&second, "verysecurepw"));
        assert!(!verify_password(&first, "wrong-password"));
        // unknown scheme or mangled storage never verifies
        assert!(!verify_password("md5$abc$def", "verysecurepw"));
        assert!(!verify_password("not-a-hash", "verysecurepw"));
    }

    #[tokio::test]
    async fn email_is_unique() {
        let (store, _temp_dir) = build_store().await;
        store
            .register_user("user@example.com", "verysecurepw", "User")
            .await
            .unwrap();
        let err = store
            .register_user("USER@example.com", "verysecurepw", "Dup")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_checks_credentials() {
        let (store, _temp_dir) = build_store().await;
        store
            .register_user("user@example.com", "verysecurepw", "User")
            .await
            .unwrap();

        assert!(store.login("user@example.com", "verysecurepw").await.is_ok());
        let err = store
            .login("user@example.com", "wrong-password")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn invite_enforces_one_membership_per_tenant() {
        let (store, _temp_dir) = build_store().await;
        store
            .register_user("root@example.com", "verysecurepw", "Root")
            .await
            .unwrap();
        let tenant = store
            .create_tenant("Helios Retail", TenantType::Retailer)
            .await
            .unwrap();

        let (user, membership) = store
            .invite_user(tenant.id, "tech@example.com", "Tech", Role::Installer, None)
            .await
            .unwrap();
        assert_eq!(user.status, UserStatus::Invited);
        assert_eq!(membership.role, Role::Installer);

        let err = store
            .invite_user(tenant.id, "tech@example.com", "Tech", Role::EndUser, None)
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Conflict(_)));

        // role update path works instead
        let updated = store
            .update_member_role(tenant.id, user.id, Role::SupportAgent)
            .await
            .unwrap();
        assert_eq!(updated.role, Role::SupportAgent);
    }

    #[tokio::test]
    async fn tenant_visibility_follows_memberships() {
        let (store, _temp_dir) = build_store().await;
        let (root, _) = store
            .register_user("root@example.com", "verysecurepw", "Root")
            .await
            .unwrap();
        let tenant_a = store
            .create_tenant("Tenant A", TenantType::Installer)
            .await
            .unwrap();
        store
            .create_tenant("Tenant B", TenantType::Retailer)
            .await
            .unwrap();
        let (member, _) = store
            .invite_user(
                tenant_a.id,
                "a@example.com",
                "A",
                Role::TenantAdmin,
                Some("verysecurepw"),
            )
            .await
            .unwrap();

        let root_session = store.session(root.id).await.unwrap();
        // platform admin sees the bootstrap tenant plus both created ones
        assert_eq!(store.list_tenants_for(&root_session).await.len(), 3);

        let member_session = store.session(member.id).await.unwrap();
        let visible = store.list_tenants_for(&member_session).await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, tenant_a.id);
    }
}
