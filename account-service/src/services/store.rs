//! Persistence interface for every entity the account core touches.
//!
//! Hosts implement [`AccountStore`] over their own database. `MemoryStore`
//! is the in-process implementation used by tests and small deployments.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    AccessToken, Device, FieldChange, OAuthClient, Permission, Principal,
    PushNotificationRecord, RefreshToken, Role, RolePermission, ScopeRef, UserRole,
    VerificationCode,
};

#[async_trait]
pub trait AccountStore: Send + Sync {
    // ==================== Principals ====================

    async fn find_principal(&self, id: Uuid) -> Result<Option<Principal>, anyhow::Error>;
    async fn find_principal_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Principal>, anyhow::Error>;
    /// Fails when the username is already taken.
    async fn insert_principal(&self, principal: &Principal) -> Result<(), anyhow::Error>;
    async fn update_principal(&self, principal: &Principal) -> Result<(), anyhow::Error>;
    /// Removes the principal with its devices, codes, tokens and role assignments.
    async fn delete_principal(&self, id: Uuid) -> Result<(), anyhow::Error>;

    // ==================== Devices ====================

    async fn find_device(&self, id: Uuid) -> Result<Option<Device>, anyhow::Error>;
    async fn find_device_by_uuid(
        &self,
        principal_id: Uuid,
        uuid: Uuid,
    ) -> Result<Option<Device>, anyhow::Error>;
    async fn find_device_by_push_token(
        &self,
        principal_id: Uuid,
        push_token: &str,
    ) -> Result<Option<Device>, anyhow::Error>;
    async fn list_devices(&self, principal_id: Uuid) -> Result<Vec<Device>, anyhow::Error>;
    async fn insert_device(&self, device: &Device) -> Result<(), anyhow::Error>;
    async fn update_device(&self, device: &Device) -> Result<(), anyhow::Error>;
    /// Remove a device together with the verification codes bound to it.
    /// Push records are kept.
    async fn delete_device(&self, id: Uuid) -> Result<(), anyhow::Error>;

    // ==================== Verification codes ====================

    async fn insert_code(&self, code: &VerificationCode) -> Result<(), anyhow::Error>;
    async fn find_code(&self, id: Uuid) -> Result<Option<VerificationCode>, anyhow::Error>;
    /// Most recent code by creation time, verified or not.
    async fn latest_code_for(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<VerificationCode>, anyhow::Error>;
    async fn latest_unverified_code_for(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<VerificationCode>, anyhow::Error>;
    /// Atomically flips `verified` from false to true. Returns `false` when
    /// the code is gone or already verified.
    async fn claim_code(&self, id: Uuid) -> Result<bool, anyhow::Error>;
    async fn delete_code(&self, id: Uuid) -> Result<(), anyhow::Error>;

    // ==================== RBAC ====================

    async fn find_permission(&self, codename: &str) -> Result<Option<Permission>, anyhow::Error>;
    async fn insert_permission(&self, permission: &Permission) -> Result<(), anyhow::Error>;
    async fn find_role(
        &self,
        codename: &str,
        scope: Option<&ScopeRef>,
    ) -> Result<Option<Role>, anyhow::Error>;
    async fn insert_role(&self, role: &Role) -> Result<(), anyhow::Error>;
    async fn update_role(&self, role: &Role) -> Result<(), anyhow::Error>;
    /// Inserting an existing link is a no-op.
    async fn link_role_permission(&self, link: &RolePermission) -> Result<(), anyhow::Error>;
    async fn permissions_for_role(&self, role_id: Uuid) -> Result<Vec<Permission>, anyhow::Error>;
    async fn find_user_role(
        &self,
        principal_id: Uuid,
        role_id: Uuid,
        scope: Option<&ScopeRef>,
    ) -> Result<Option<UserRole>, anyhow::Error>;
    async fn insert_user_role(&self, user_role: &UserRole) -> Result<(), anyhow::Error>;
    /// Roles assigned to the principal under exactly `scope`. `None` means
    /// global assignments only.
    async fn roles_for_principal(
        &self,
        principal_id: Uuid,
        scope: Option<&ScopeRef>,
    ) -> Result<Vec<Role>, anyhow::Error>;

    // ==================== OAuth ====================

    async fn find_client(&self, client_id: &str) -> Result<Option<OAuthClient>, anyhow::Error>;
    async fn insert_client(&self, client: &OAuthClient) -> Result<(), anyhow::Error>;
    async fn insert_access_token(&self, token: &AccessToken) -> Result<(), anyhow::Error>;
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), anyhow::Error>;
    async fn find_access_token(&self, token: &str) -> Result<Option<AccessToken>, anyhow::Error>;
    /// Also removes refresh tokens linked to the access token.
    async fn delete_access_token(&self, id: Uuid) -> Result<(), anyhow::Error>;

    // ==================== Journal and push log ====================

    async fn append_field_change(&self, change: &FieldChange) -> Result<(), anyhow::Error>;
    async fn field_changes(
        &self,
        entity: &str,
        entity_id: Uuid,
    ) -> Result<Vec<FieldChange>, anyhow::Error>;
    async fn insert_push_notification(
        &self,
        record: &PushNotificationRecord,
    ) -> Result<(), anyhow::Error>;
    async fn push_notifications_for(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<PushNotificationRecord>, anyhow::Error>;
}
