use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::store::AccountStore;
use crate::models::{
    AccessToken, Device, FieldChange, OAuthClient, Permission, Principal,
    PushNotificationRecord, RefreshToken, Role, RolePermission, ScopeRef, UserRole,
    VerificationCode,
};

#[derive(Default)]
struct Tables {
    principals: HashMap<Uuid, Principal>,
    devices: HashMap<Uuid, Device>,
    codes: Vec<VerificationCode>,
    permissions: HashMap<Uuid, Permission>,
    roles: HashMap<Uuid, Role>,
    role_permissions: Vec<RolePermission>,
    user_roles: Vec<UserRole>,
    clients: HashMap<String, OAuthClient>,
    access_tokens: HashMap<Uuid, AccessToken>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    field_changes: Vec<FieldChange>,
    push_notifications: Vec<PushNotificationRecord>,
}

/// In-memory [`AccountStore`]. Every operation takes the same lock, which
/// makes `claim_code` a true compare-and-swap.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, anyhow::Error> {
        self.tables
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory store mutex poisoned: {}", e))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_principal(&self, id: Uuid) -> Result<Option<Principal>, anyhow::Error> {
        Ok(self.tables()?.principals.get(&id).cloned())
    }

    async fn find_principal_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Principal>, anyhow::Error> {
        Ok(self
            .tables()?
            .principals
            .values()
            .find(|p| p.username == username)
            .cloned())
    }

    async fn insert_principal(&self, principal: &Principal) -> Result<(), anyhow::Error> {
        let mut tables = self.tables()?;
        if tables
            .principals
            .values()
            .any(|p| p.username == principal.username)
        {
            return Err(anyhow::anyhow!("Username not available"));
        }
        tables.principals.insert(principal.id, principal.clone());
        Ok(())
    }

    async fn update_principal(&self, principal: &Principal) -> Result<(), anyhow::Error> {
        let mut tables = self.tables()?;
        if tables
            .principals
            .values()
            .any(|p| p.id != principal.id && p.username == principal.username)
        {
            return Err(anyhow::anyhow!("Username not available"));
        }
        match tables.principals.get_mut(&principal.id) {
            Some(existing) => {
                *existing = principal.clone();
                Ok(())
            }
            None => Err(anyhow::anyhow!("Principal {} does not exist", principal.id)),
        }
    }

    async fn delete_principal(&self, id: Uuid) -> Result<(), anyhow::Error> {
        let mut tables = self.tables()?;
        tables.principals.remove(&id);
        tables.devices.retain(|_, d| d.principal_id != id);
        tables.codes.retain(|c| c.principal_id != id);
        tables.user_roles.retain(|ur| ur.principal_id != id);
        tables.access_tokens.retain(|_, t| t.principal_id != id);
        tables.refresh_tokens.retain(|_, t| t.principal_id != id);
        Ok(())
    }

    async fn find_device(&self, id: Uuid) -> Result<Option<Device>, anyhow::Error> {
        Ok(self.tables()?.devices.get(&id).cloned())
    }

    async fn find_device_by_uuid(
        &self,
        principal_id: Uuid,
        uuid: Uuid,
    ) -> Result<Option<Device>, anyhow::Error> {
        Ok(self
            .tables()?
            .devices
            .values()
            .find(|d| d.principal_id == principal_id && d.uuid == uuid)
            .cloned())
    }

    async fn find_device_by_push_token(
        &self,
        principal_id: Uuid,
        push_token: &str,
    ) -> Result<Option<Device>, anyhow::Error> {
        Ok(self
            .tables()?
            .devices
            .values()
            .find(|d| d.principal_id == principal_id && d.push_token.as_deref() == Some(push_token))
            .cloned())
    }

    async fn list_devices(&self, principal_id: Uuid) -> Result<Vec<Device>, anyhow::Error> {
        let mut devices: Vec<Device> = self
            .tables()?
            .devices
            .values()
            .filter(|d| d.principal_id == principal_id)
            .cloned()
            .collect();
        devices.sort_by_key(|d| d.created_utc);
        Ok(devices)
    }

    async fn insert_device(&self, device: &Device) -> Result<(), anyhow::Error> {
        self.tables()?.devices.insert(device.id, device.clone());
        Ok(())
    }

    async fn update_device(&self, device: &Device) -> Result<(), anyhow::Error> {
        let mut tables = self.tables()?;
        match tables.devices.get_mut(&device.id) {
            Some(existing) => {
                *existing = device.clone();
                Ok(())
            }
            None => Err(anyhow::anyhow!("Device {} does not exist", device.id)),
        }
    }

    async fn delete_device(&self, id: Uuid) -> Result<(), anyhow::Error> {
        let mut tables = self.tables()?;
        tables.devices.remove(&id);
        tables.codes.retain(|c| c.device_id != Some(id));
        Ok(())
    }

    async fn insert_code(&self, code: &VerificationCode) -> Result<(), anyhow::Error> {
        self.tables()?.codes.push(code.clone());
        Ok(())
    }

    async fn find_code(&self, id: Uuid) -> Result<Option<VerificationCode>, anyhow::Error> {
        Ok(self.tables()?.codes.iter().find(|c| c.id == id).cloned())
    }

    async fn latest_code_for(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<VerificationCode>, anyhow::Error> {
        // max_by_key keeps the last of equal timestamps, i.e. the newest insert
        Ok(self
            .tables()?
            .codes
            .iter()
            .filter(|c| c.principal_id == principal_id)
            .max_by_key(|c| c.created_utc)
            .cloned())
    }

    async fn latest_unverified_code_for(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<VerificationCode>, anyhow::Error> {
        Ok(self
            .tables()?
            .codes
            .iter()
            .filter(|c| c.principal_id == principal_id && !c.verified)
            .max_by_key(|c| c.created_utc)
            .cloned())
    }

    async fn claim_code(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        let mut tables = self.tables()?;
        match tables.codes.iter_mut().find(|c| c.id == id) {
            Some(code) if !code.verified => {
                code.verified = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_code(&self, id: Uuid) -> Result<(), anyhow::Error> {
        self.tables()?.codes.retain(|c| c.id != id);
        Ok(())
    }

    async fn find_permission(&self, codename: &str) -> Result<Option<Permission>, anyhow::Error> {
        Ok(self
            .tables()?
            .permissions
            .values()
            .find(|p| p.codename == codename)
            .cloned())
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<(), anyhow::Error> {
        let mut tables = self.tables()?;
        if tables
            .permissions
            .values()
            .any(|p| p.codename == permission.codename)
        {
            return Err(anyhow::anyhow!(
                "Permission {} already exists",
                permission.codename
            ));
        }
        tables.permissions.insert(permission.id, permission.clone());
        Ok(())
    }

    async fn find_role(
        &self,
        codename: &str,
        scope: Option<&ScopeRef>,
    ) -> Result<Option<Role>, anyhow::Error> {
        Ok(self
            .tables()?
            .roles
            .values()
            .find(|r| r.codename == codename && r.scope.as_ref() == scope)
            .cloned())
    }

    async fn insert_role(&self, role: &Role) -> Result<(), anyhow::Error> {
        self.tables()?.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> Result<(), anyhow::Error> {
        let mut tables = self.tables()?;
        match tables.roles.get_mut(&role.id) {
            Some(existing) => {
                *existing = role.clone();
                Ok(())
            }
            None => Err(anyhow::anyhow!("Role {} does not exist", role.id)),
        }
    }

    async fn link_role_permission(&self, link: &RolePermission) -> Result<(), anyhow::Error> {
        let mut tables = self.tables()?;
        let exists = tables
            .role_permissions
            .iter()
            .any(|rp| rp.role_id == link.role_id && rp.permission_id == link.permission_id);
        if !exists {
            tables.role_permissions.push(link.clone());
        }
        Ok(())
    }

    async fn permissions_for_role(&self, role_id: Uuid) -> Result<Vec<Permission>, anyhow::Error> {
        let tables = self.tables()?;
        Ok(tables
            .role_permissions
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .filter_map(|rp| tables.permissions.get(&rp.permission_id).cloned())
            .collect())
    }

    async fn find_user_role(
        &self,
        principal_id: Uuid,
        role_id: Uuid,
        scope: Option<&ScopeRef>,
    ) -> Result<Option<UserRole>, anyhow::Error> {
        Ok(self
            .tables()?
            .user_roles
            .iter()
            .find(|ur| {
                ur.principal_id == principal_id && ur.role_id == role_id && ur.scope.as_ref() == scope
            })
            .cloned())
    }

    async fn insert_user_role(&self, user_role: &UserRole) -> Result<(), anyhow::Error> {
        self.tables()?.user_roles.push(user_role.clone());
        Ok(())
    }

    async fn roles_for_principal(
        &self,
        principal_id: Uuid,
        scope: Option<&ScopeRef>,
    ) -> Result<Vec<Role>, anyhow::Error> {
        let tables = self.tables()?;
        Ok(tables
            .user_roles
            .iter()
            .filter(|ur| ur.principal_id == principal_id && ur.scope.as_ref() == scope)
            .filter_map(|ur| tables.roles.get(&ur.role_id).cloned())
            .collect())
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<OAuthClient>, anyhow::Error> {
        Ok(self.tables()?.clients.get(client_id).cloned())
    }

    async fn insert_client(&self, client: &OAuthClient) -> Result<(), anyhow::Error> {
        self.tables()?
            .clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn insert_access_token(&self, token: &AccessToken) -> Result<(), anyhow::Error> {
        self.tables()?.access_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), anyhow::Error> {
        self.tables()?.refresh_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_access_token(&self, token: &str) -> Result<Option<AccessToken>, anyhow::Error> {
        Ok(self
            .tables()?
            .access_tokens
            .values()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn delete_access_token(&self, id: Uuid) -> Result<(), anyhow::Error> {
        let mut tables = self.tables()?;
        tables.access_tokens.remove(&id);
        tables.refresh_tokens.retain(|_, t| t.access_token_id != id);
        Ok(())
    }

    async fn append_field_change(&self, change: &FieldChange) -> Result<(), anyhow::Error> {
        self.tables()?.field_changes.push(change.clone());
        Ok(())
    }

    async fn field_changes(
        &self,
        entity: &str,
        entity_id: Uuid,
    ) -> Result<Vec<FieldChange>, anyhow::Error> {
        Ok(self
            .tables()?
            .field_changes
            .iter()
            .filter(|c| c.entity == entity && c.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn insert_push_notification(
        &self,
        record: &PushNotificationRecord,
    ) -> Result<(), anyhow::Error> {
        self.tables()?.push_notifications.push(record.clone());
        Ok(())
    }

    async fn push_notifications_for(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<PushNotificationRecord>, anyhow::Error> {
        Ok(self
            .tables()?
            .push_notifications
            .iter()
            .filter(|r| r.principal_id == principal_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn code_for(principal_id: Uuid, age_seconds: i64) -> VerificationCode {
        let mut code = VerificationCode::new(principal_id, None, "hash".into(), None);
        code.created_utc = Utc::now() - Duration::seconds(age_seconds);
        code
    }

    #[tokio::test]
    async fn test_latest_code_by_creation_time() {
        let store = MemoryStore::new();
        let principal_id = Uuid::new_v4();
        let newer = code_for(principal_id, 10);
        let older = code_for(principal_id, 100);
        store.insert_code(&newer).await.unwrap();
        store.insert_code(&older).await.unwrap();

        let latest = store.latest_code_for(principal_id).await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
    }

    #[tokio::test]
    async fn test_claim_code_only_once() {
        let store = MemoryStore::new();
        let code = code_for(Uuid::new_v4(), 0);
        store.insert_code(&code).await.unwrap();

        assert!(store.claim_code(code.id).await.unwrap());
        assert!(!store.claim_code(code.id).await.unwrap());
        assert!(!store.claim_code(Uuid::new_v4()).await.unwrap());
        assert!(store
            .latest_unverified_code_for(code.principal_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = MemoryStore::new();
        store
            .insert_principal(&Principal::new("alice", "alice@x.io"))
            .await
            .unwrap();
        let result = store
            .insert_principal(&Principal::new("alice", "other@x.io"))
            .await;
        assert!(result.is_err());

        let mut bob = Principal::new("bob", "bob@x.io");
        store.insert_principal(&bob).await.unwrap();
        bob.username = "alice".to_string();
        assert!(store.update_principal(&bob).await.is_err());
        let stored = store.find_principal(bob.id).await.unwrap().unwrap();
        assert_eq!(stored.username, "bob");
    }

    #[tokio::test]
    async fn test_delete_device_drops_bound_codes() {
        let store = MemoryStore::new();
        let principal_id = Uuid::new_v4();
        let device = Device::new(principal_id);
        store.insert_device(&device).await.unwrap();

        let mut bound = code_for(principal_id, 0);
        bound.device_id = Some(device.id);
        let unbound = code_for(principal_id, 5);
        store.insert_code(&bound).await.unwrap();
        store.insert_code(&unbound).await.unwrap();

        store.delete_device(device.id).await.unwrap();

        assert!(store.find_device(device.id).await.unwrap().is_none());
        assert!(store.find_code(bound.id).await.unwrap().is_none());
        assert!(store.find_code(unbound.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_principal_cascades() {
        let store = MemoryStore::new();
        let principal = Principal::new("alice", "alice@x.io");
        store.insert_principal(&principal).await.unwrap();
        store.insert_device(&Device::new(principal.id)).await.unwrap();
        store.insert_code(&code_for(principal.id, 0)).await.unwrap();

        store.delete_principal(principal.id).await.unwrap();

        assert!(store.list_devices(principal.id).await.unwrap().is_empty());
        assert!(store.latest_code_for(principal.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_roles_for_principal_match_exact_scope() {
        let store = MemoryStore::new();
        let principal_id = Uuid::new_v4();
        let scope_a = ScopeRef::new("project", "a");
        let role = Role::new("Editor", "editor_a", Some(scope_a.clone()));
        store.insert_role(&role).await.unwrap();
        store
            .insert_user_role(&UserRole::new(principal_id, role.id, Some(scope_a.clone())))
            .await
            .unwrap();

        let scope_b = ScopeRef::new("project", "b");
        assert_eq!(
            store
                .roles_for_principal(principal_id, Some(&scope_a))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .roles_for_principal(principal_id, Some(&scope_b))
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .roles_for_principal(principal_id, None)
            .await
            .unwrap()
            .is_empty());
    }
}
