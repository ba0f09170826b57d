use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::error::AccountError;
use crate::models::{Project, ProjectMembership};

/// Host lookup for one kind of scope entity.
#[async_trait]
pub trait ScopeResolver: Send + Sync {
    async fn find_project(&self, id: &str) -> Result<Option<Project>, anyhow::Error>;
    async fn find_membership(
        &self,
        principal_id: Uuid,
        project: &Project,
    ) -> Result<Option<ProjectMembership>, anyhow::Error>;
}

/// Maps scope kinds to their resolvers.
#[derive(Clone, Default)]
pub struct ScopeRegistry {
    resolvers: HashMap<String, Arc<dyn ScopeResolver>>,
    project_kind: Option<String>,
}

impl ScopeRegistry {
    pub fn new(project_kind: Option<String>) -> Self {
        Self {
            resolvers: HashMap::new(),
            project_kind,
        }
    }

    pub fn register(mut self, kind: impl Into<String>, resolver: Arc<dyn ScopeResolver>) -> Self {
        self.resolvers.insert(kind.into(), resolver);
        self
    }

    pub fn project_kind(&self) -> Option<&str> {
        self.project_kind.as_deref()
    }

    pub fn resolver(&self, kind: &str) -> Result<Arc<dyn ScopeResolver>, AccountError> {
        self.resolvers.get(kind).cloned().ok_or_else(|| {
            AccountError::Configuration(format!("no scope resolver registered for kind '{}'", kind))
        })
    }

    /// Resolver for the configured project kind.
    pub fn project_resolver(&self) -> Result<Arc<dyn ScopeResolver>, AccountError> {
        let kind = self.project_kind.as_deref().ok_or_else(|| {
            AccountError::Configuration("project scoping is not configured".to_string())
        })?;
        self.resolver(kind)
    }
}

/// In-memory resolver for hosts with a fixed project list, and for tests.
pub struct StaticScopeResolver {
    kind: String,
    projects: Mutex<HashMap<String, Project>>,
    memberships: Mutex<HashMap<(Uuid, String), ProjectMembership>>,
}

impl StaticScopeResolver {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            projects: Mutex::new(HashMap::new()),
            memberships: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_project(&self, id: &str, name: Option<&str>) -> Result<Project, anyhow::Error> {
        let mut project = Project::new(self.kind.clone(), id);
        project.name = name.map(str::to_string);
        self.projects
            .lock()
            .map_err(|e| anyhow::anyhow!("Scope resolver mutex poisoned: {}", e))?
            .insert(id.to_string(), project.clone());
        Ok(project)
    }

    pub fn add_membership(
        &self,
        principal_id: Uuid,
        project: &Project,
        membership: ProjectMembership,
    ) -> Result<(), anyhow::Error> {
        self.memberships
            .lock()
            .map_err(|e| anyhow::anyhow!("Scope resolver mutex poisoned: {}", e))?
            .insert((principal_id, project.id().to_string()), membership);
        Ok(())
    }
}

#[async_trait]
impl ScopeResolver for StaticScopeResolver {
    async fn find_project(&self, id: &str) -> Result<Option<Project>, anyhow::Error> {
        Ok(self
            .projects
            .lock()
            .map_err(|e| anyhow::anyhow!("Scope resolver mutex poisoned: {}", e))?
            .get(id)
            .cloned())
    }

    async fn find_membership(
        &self,
        principal_id: Uuid,
        project: &Project,
    ) -> Result<Option<ProjectMembership>, anyhow::Error> {
        Ok(self
            .memberships
            .lock()
            .map_err(|e| anyhow::anyhow!("Scope resolver mutex poisoned: {}", e))?
            .get(&(principal_id, project.id().to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_kind_is_configuration_error() {
        let registry = ScopeRegistry::new(Some("project".into()));
        match registry.resolver("team") {
            Err(AccountError::Configuration(msg)) => assert!(msg.contains("team")),
            _ => panic!("expected configuration error"),
        }
    }

    #[test]
    fn test_project_scoping_unconfigured() {
        let registry = ScopeRegistry::default();
        assert!(matches!(
            registry.project_resolver(),
            Err(AccountError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_static_resolver_lookup() {
        let resolver = Arc::new(StaticScopeResolver::new("project"));
        let project = resolver.add_project("42", Some("Apollo")).unwrap();
        let principal_id = Uuid::new_v4();
        resolver
            .add_membership(principal_id, &project, ProjectMembership::default())
            .unwrap();

        let registry = ScopeRegistry::new(Some("project".into())).register("project", resolver);
        let found = registry
            .project_resolver()
            .unwrap()
            .find_project("42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.scope.kind, "project");
        assert_eq!(found.name.as_deref(), Some("Apollo"));

        let membership = registry
            .resolver("project")
            .unwrap()
            .find_membership(principal_id, &found)
            .await
            .unwrap();
        assert!(membership.is_some());
    }
}
