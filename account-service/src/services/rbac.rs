//! Role and permission resolution, globally or within a project scope.

use std::collections::HashSet;
use std::sync::Arc;

use super::error::AccountError;
use super::metrics;
use super::scope::ScopeRegistry;
use super::store::AccountStore;
use crate::models::{Permission, Principal, Project, Role, RolePermission, UserRole};

const ROLE_ACTION_PREFIX: &str = "role:";

#[derive(Clone)]
pub struct RbacService {
    store: Arc<dyn AccountStore>,
    scopes: Arc<ScopeRegistry>,
    auto_register: bool,
}

impl RbacService {
    pub fn new(store: Arc<dyn AccountStore>, scopes: Arc<ScopeRegistry>, auto_register: bool) -> Self {
        Self {
            store,
            scopes,
            auto_register,
        }
    }

    pub fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    /// Whether `principal` may perform `action`, optionally inside `project`.
    ///
    /// Unknown actions are denied. With auto-registration enabled they are
    /// added to the catalog so they can be granted later. A missing scope
    /// resolver is a `Configuration` error, never a deny.
    #[tracing::instrument(skip(self, principal, project), fields(principal_id = %principal.id, project = ?project.map(|p| p.scope.to_string())))]
    pub async fn check_perm(
        &self,
        principal: &Principal,
        action: &str,
        project: Option<&Project>,
    ) -> Result<bool, AccountError> {
        let allowed = self.decide(principal, action, project).await?;

        let decision = if allowed { "allow" } else { "deny" };
        metrics::record_permission_decision(decision);
        tracing::debug!(decision, "Permission decided");

        Ok(allowed)
    }

    async fn decide(
        &self,
        principal: &Principal,
        action: &str,
        project: Option<&Project>,
    ) -> Result<bool, AccountError> {
        if principal.is_superuser {
            return Ok(true);
        }

        if self.store.find_permission(&action.to_lowercase()).await?.is_none() {
            if self.auto_register {
                self.ensure_permission_registered(action, None).await?;
            }
            return Ok(false);
        }

        match project {
            Some(project) => self.decide_in_project(principal, action, project).await,
            None => self.decide_global(principal, action).await,
        }
    }

    async fn decide_in_project(
        &self,
        principal: &Principal,
        action: &str,
        project: &Project,
    ) -> Result<bool, AccountError> {
        let resolver = self.scopes.resolver(&project.scope.kind)?;

        let Some(membership) = resolver.find_membership(principal.id, project).await? else {
            return Ok(false);
        };
        if membership.enabled == Some(false) {
            return Ok(false);
        }
        if membership.is_superuser == Some(true) {
            return Ok(true);
        }
        if let (Some(role), Some(wanted)) = (
            membership.role.as_deref(),
            action.strip_prefix(ROLE_ACTION_PREFIX),
        ) {
            return Ok(role.eq_ignore_ascii_case(wanted));
        }

        let roles = self
            .store
            .roles_for_principal(principal.id, Some(&project.scope))
            .await?;
        for role in roles {
            let permissions = self.store.permissions_for_role(role.id).await?;
            if permissions
                .iter()
                .any(|p| p.codename.eq_ignore_ascii_case(action))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn decide_global(&self, principal: &Principal, action: &str) -> Result<bool, AccountError> {
        let roles = self.store.roles_for_principal(principal.id, None).await?;

        let mut codenames = HashSet::new();
        for role in roles.iter().filter(|r| r.enabled) {
            for permission in self.store.permissions_for_role(role.id).await? {
                codenames.insert(permission.codename);
            }
        }
        Ok(codenames.contains(action))
    }

    // ==================== Provisioning ====================

    /// Get the catalog entry for `codename`, creating it when missing.
    pub async fn ensure_permission_registered(
        &self,
        codename: &str,
        name: Option<&str>,
    ) -> Result<Permission, AccountError> {
        if let Some(existing) = self.store.find_permission(&codename.to_lowercase()).await? {
            return Ok(existing);
        }

        let mut permission = Permission::new(codename);
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            permission.name = name.to_string();
        }
        self.store.insert_permission(&permission).await?;
        tracing::info!(codename = %permission.codename, "Permission registered");
        Ok(permission)
    }

    /// Role scoped to `project`. The stored name always ends with `_<project id>`.
    pub async fn get_or_create_project_role(
        &self,
        project: &Project,
        role_name: &str,
    ) -> Result<Role, AccountError> {
        let name = project_role_name(project, role_name);
        let codename = name.to_lowercase();

        if let Some(role) = self.store.find_role(&codename, Some(&project.scope)).await? {
            return Ok(role);
        }

        let role = Role::new(name, &codename, Some(project.scope.clone()));
        self.store.insert_role(&role).await?;
        tracing::info!(role = %role.codename, project = %project.scope, "Project role created");
        Ok(role)
    }

    pub async fn get_or_create_project_role_permission(
        &self,
        project: &Project,
        role_name: &str,
        codename: &str,
        verbose_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(Role, Permission), AccountError> {
        let role = self.get_or_create_project_role(project, role_name).await?;

        let permission = match self.store.find_permission(&codename.to_lowercase()).await? {
            Some(existing) => existing,
            None => {
                let mut permission = Permission::new(codename);
                permission.description = description.map(str::to_string);
                self.store.insert_permission(&permission).await?;
                permission
            }
        };

        self.store
            .link_role_permission(&RolePermission {
                role_id: role.id,
                permission_id: permission.id,
                display_name: verbose_name.map(str::to_string),
            })
            .await?;

        Ok((role, permission))
    }

    pub async fn add_user_to_role(
        &self,
        principal: &Principal,
        project: &Project,
        role_name: &str,
    ) -> Result<UserRole, AccountError> {
        let role = self.get_or_create_project_role(project, role_name).await?;
        self.assign(principal, &role).await
    }

    /// Global role linked to `permissions`, which are registered as needed.
    pub async fn create_global_role(
        &self,
        codename: &str,
        name: Option<&str>,
        permissions: &[&str],
    ) -> Result<Role, AccountError> {
        let role = match self.store.find_role(&codename.to_lowercase(), None).await? {
            Some(role) => role,
            None => {
                let mut role = Role::global(codename);
                if let Some(name) = name {
                    role.name = name.to_string();
                }
                self.store.insert_role(&role).await?;
                role
            }
        };

        for codename in permissions {
            let permission = self.ensure_permission_registered(codename, None).await?;
            self.store
                .link_role_permission(&RolePermission {
                    role_id: role.id,
                    permission_id: permission.id,
                    display_name: None,
                })
                .await?;
        }

        Ok(role)
    }

    pub async fn grant_global_role(
        &self,
        principal: &Principal,
        codename: &str,
    ) -> Result<UserRole, AccountError> {
        let role = self
            .store
            .find_role(&codename.to_lowercase(), None)
            .await?
            .ok_or_else(|| AccountError::NotFound("Role".to_string()))?;
        self.assign(principal, &role).await
    }

    async fn assign(&self, principal: &Principal, role: &Role) -> Result<UserRole, AccountError> {
        if let Some(existing) = self
            .store
            .find_user_role(principal.id, role.id, role.scope.as_ref())
            .await?
        {
            return Ok(existing);
        }

        let user_role = UserRole::new(principal.id, role.id, role.scope.clone());
        self.store.insert_user_role(&user_role).await?;
        tracing::info!(principal_id = %principal.id, role = %role.codename, "Role assigned");
        Ok(user_role)
    }
}

fn project_role_name(project: &Project, role_name: &str) -> String {
    let suffix = format!("_{}", project.id());
    if role_name.ends_with(&suffix) {
        role_name.to_string()
    } else {
        format!("{}{}", role_name, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectMembership;
    use crate::services::memory_store::MemoryStore;
    use crate::services::scope::StaticScopeResolver;

    struct Fixture {
        rbac: RbacService,
        store: Arc<MemoryStore>,
        resolver: Arc<StaticScopeResolver>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(StaticScopeResolver::new("project"));
        let scopes = ScopeRegistry::new(Some("project".to_string()))
            .register("project", resolver.clone());
        let rbac = RbacService::new(store.clone(), Arc::new(scopes), true);
        Fixture {
            rbac,
            store,
            resolver,
        }
    }

    #[test]
    fn test_project_role_name_suffix() {
        let project = Project::new("project", "7");
        assert_eq!(project_role_name(&project, "editor"), "editor_7");
        assert_eq!(project_role_name(&project, "editor_7"), "editor_7");
    }

    #[tokio::test]
    async fn test_superuser_always_passes() {
        let f = fixture();
        let root = Principal::superuser("root", "root@example.com");
        let project = Project::new("unregistered", "1");

        assert!(f.rbac.check_perm(&root, "anything", None).await.unwrap());
        assert!(f.rbac.check_perm(&root, "anything", Some(&project)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_action_registers_and_denies() {
        let f = fixture();
        let alice = Principal::new("alice", "alice@example.com");

        assert!(!f.rbac.check_perm(&alice, "can_edit_doc", None).await.unwrap());
        let registered = f.store.find_permission("can_edit_doc").await.unwrap().unwrap();
        assert_eq!(registered.name, "Can edit doc");

        assert!(!f.rbac.check_perm(&alice, "can_edit_doc", None).await.unwrap());

        f.rbac
            .create_global_role("editor", None, &["can_edit_doc"])
            .await
            .unwrap();
        f.rbac.grant_global_role(&alice, "editor").await.unwrap();
        assert!(f.rbac.check_perm(&alice, "can_edit_doc", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_auto_register_disabled_leaves_catalog_alone() {
        let store = Arc::new(MemoryStore::new());
        let rbac = RbacService::new(store.clone(), Arc::new(ScopeRegistry::default()), false);
        let alice = Principal::new("alice", "alice@example.com");

        assert!(!rbac.check_perm(&alice, "can_edit_doc", None).await.unwrap());
        assert!(store.find_permission("can_edit_doc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disabled_global_role_is_ignored() {
        let f = fixture();
        let alice = Principal::new("alice", "alice@example.com");
        let mut role = f
            .rbac
            .create_global_role("editor", None, &["can_edit_doc"])
            .await
            .unwrap();
        f.rbac.grant_global_role(&alice, "editor").await.unwrap();

        role.enabled = false;
        f.store.update_role(&role).await.unwrap();
        assert!(!f.rbac.check_perm(&alice, "can_edit_doc", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_project_scoping() {
        let f = fixture();
        let alice = Principal::new("alice", "alice@example.com");
        let a = f.resolver.add_project("a", Some("A")).unwrap();
        let b = f.resolver.add_project("b", Some("B")).unwrap();
        f.resolver
            .add_membership(alice.id, &a, ProjectMembership::default())
            .unwrap();
        f.resolver
            .add_membership(alice.id, &b, ProjectMembership::default())
            .unwrap();

        f.rbac
            .get_or_create_project_role_permission(&a, "editor", "can_edit_doc", None, None)
            .await
            .unwrap();
        f.rbac.add_user_to_role(&alice, &a, "editor").await.unwrap();

        assert!(f.rbac.check_perm(&alice, "can_edit_doc", Some(&a)).await.unwrap());
        assert!(!f.rbac.check_perm(&alice, "can_edit_doc", Some(&b)).await.unwrap());
        assert!(!f.rbac.check_perm(&alice, "can_edit_doc", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_membership_flags() {
        let f = fixture();
        let alice = Principal::new("alice", "alice@example.com");
        let bob = Principal::new("bob", "bob@example.com");
        let carol = Principal::new("carol", "carol@example.com");
        let p = f.resolver.add_project("p", None).unwrap();
        f.rbac.ensure_permission_registered("can_edit_doc", None).await.unwrap();
        f.rbac.ensure_permission_registered("role:manager", None).await.unwrap();

        f.resolver.add_membership(
            alice.id,
            &p,
            ProjectMembership {
                enabled: Some(false),
                is_superuser: Some(true),
                role: None,
            },
        )
        .unwrap();
        f.resolver.add_membership(
            bob.id,
            &p,
            ProjectMembership {
                enabled: Some(true),
                is_superuser: Some(true),
                role: None,
            },
        )
        .unwrap();
        f.resolver.add_membership(
            carol.id,
            &p,
            ProjectMembership {
                role: Some("Manager".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(!f.rbac.check_perm(&alice, "can_edit_doc", Some(&p)).await.unwrap());
        assert!(f.rbac.check_perm(&bob, "can_edit_doc", Some(&p)).await.unwrap());
        assert!(f.rbac.check_perm(&carol, "role:manager", Some(&p)).await.unwrap());
        assert!(!f.rbac.check_perm(&carol, "can_edit_doc", Some(&p)).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_membership_denies() {
        let f = fixture();
        let alice = Principal::new("alice", "alice@example.com");
        let p = f.resolver.add_project("p", None).unwrap();
        f.rbac.ensure_permission_registered("can_edit_doc", None).await.unwrap();

        assert!(!f.rbac.check_perm(&alice, "can_edit_doc", Some(&p)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unregistered_scope_kind_is_configuration_error() {
        let f = fixture();
        let alice = Principal::new("alice", "alice@example.com");
        let foreign = Project::new("team", "1");
        f.rbac.ensure_permission_registered("can_edit_doc", None).await.unwrap();

        let err = f
            .rbac
            .check_perm(&alice, "can_edit_doc", Some(&foreign))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_provisioning_is_idempotent() {
        let f = fixture();
        let alice = Principal::new("alice", "alice@example.com");
        let p = Project::new("project", "9");

        let first = f.rbac.add_user_to_role(&alice, &p, "Viewer").await.unwrap();
        let second = f.rbac.add_user_to_role(&alice, &p, "viewer_9").await.unwrap();
        assert_eq!(first.id, second.id);

        let role = f.store.find_role("viewer_9", Some(&p.scope)).await.unwrap().unwrap();
        assert_eq!(role.name, "Viewer_9");
    }
}
