//! Configuration and identity lookups consumed by the pipeline.
//!
//! The catalog is owned by the surrounding platform; the pipeline only reads
//! service snapshots through it and reports the one state change it is
//! allowed to make, disabling a service that keeps failing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CatalogError;

/// Project identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Service identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub i64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workspace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(pub i64);

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a service is eligible for enhancement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Healthy,
    /// Disabled after repeated failures. Only the platform clears this.
    Error,
}

/// A deployed unit within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub project_id: ProjectId,
    pub name: String,
    /// Hosted repository as `owner/name`.
    pub repo_path: Option<String>,
    /// Path prefix present in captured file names.
    pub build_prefix: Option<String>,
    /// Path prefix of the same files in the repository.
    pub repo_prefix: Option<String>,
    pub status: ServiceStatus,
    /// Diagnostics recorded alongside an error status.
    #[serde(default)]
    pub error_details: Vec<String>,
}

impl Service {
    pub fn new(id: i64, project_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: ServiceId(id),
            project_id: ProjectId(project_id),
            name: name.into(),
            repo_path: None,
            build_prefix: None,
            repo_prefix: None,
            status: ServiceStatus::Healthy,
            error_details: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_repo(mut self, repo_path: impl Into<String>) -> Self {
        self.repo_path = Some(repo_path.into());
        self
    }

    #[must_use]
    pub fn with_build_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.build_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_repo_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.repo_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub const fn with_status(mut self, status: ServiceStatus) -> Self {
        self.status = status;
        self
    }
}

/// Platform-wide settings read by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfiguration {
    /// Regular expressions; matching repository paths are never fetched.
    #[serde(default)]
    pub ignored_files: Vec<String>,
}

/// A workspace owning projects and their integrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: WorkspaceId,
}

/// Integrations a workspace can hold an access token for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    GitHub,
}

/// Lookups the pipeline needs from the platform's configuration store.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// Finds a service by project and name.
    async fn find_service(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<Service>, CatalogError>;

    /// Finds the workspace that owns a project.
    async fn workspace_for_project(
        &self,
        project: ProjectId,
    ) -> Result<Option<Workspace>, CatalogError>;

    /// Returns the workspace's access token for an integration.
    async fn access_token(
        &self,
        workspace: &Workspace,
        kind: IntegrationKind,
    ) -> Result<Option<SecretString>, CatalogError>;

    async fn system_configuration(&self) -> Result<SystemConfiguration, CatalogError>;

    /// Moves a service to [`ServiceStatus::Error`] with diagnostics.
    async fn set_service_error(
        &self,
        service: ServiceId,
        messages: Vec<String>,
    ) -> Result<(), CatalogError>;
}

#[derive(Debug, Default)]
struct CatalogData {
    services: HashMap<ServiceId, Service>,
    workspaces: HashMap<ProjectId, Workspace>,
    tokens: HashMap<(WorkspaceId, IntegrationKind), String>,
    system: SystemConfiguration,
    error_updates: u32,
}

/// In-memory catalog for tests and single-process embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    data: Arc<RwLock<CatalogData>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_service(&self, service: Service) {
        self.data.write().await.services.insert(service.id, service);
    }

    pub async fn insert_workspace(&self, project: ProjectId, workspace: Workspace) {
        self.data.write().await.workspaces.insert(project, workspace);
    }

    pub async fn insert_token(
        &self,
        workspace: WorkspaceId,
        kind: IntegrationKind,
        token: impl Into<String>,
    ) {
        self.data
            .write()
            .await
            .tokens
            .insert((workspace, kind), token.into());
    }

    pub async fn set_ignored_files(&self, patterns: Vec<String>) {
        self.data.write().await.system.ignored_files = patterns;
    }

    /// Current snapshot of a service.
    pub async fn service(&self, id: ServiceId) -> Option<Service> {
        self.data.read().await.services.get(&id).cloned()
    }

    /// How many times a service has been moved to the error state.
    pub async fn error_updates(&self) -> u32 {
        self.data.read().await.error_updates
    }
}

#[async_trait]
impl ServiceCatalog for MemoryCatalog {
    async fn find_service(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<Service>, CatalogError> {
        let data = self.data.read().await;
        Ok(data
            .services
            .values()
            .find(|s| s.project_id == project && s.name == name)
            .cloned())
    }

    async fn workspace_for_project(
        &self,
        project: ProjectId,
    ) -> Result<Option<Workspace>, CatalogError> {
        Ok(self.data.read().await.workspaces.get(&project).cloned())
    }

    async fn access_token(
        &self,
        workspace: &Workspace,
        kind: IntegrationKind,
    ) -> Result<Option<SecretString>, CatalogError> {
        let data = self.data.read().await;
        Ok(data
            .tokens
            .get(&(workspace.id, kind))
            .map(|token| SecretString::from(token.clone())))
    }

    async fn system_configuration(&self) -> Result<SystemConfiguration, CatalogError> {
        Ok(self.data.read().await.system.clone())
    }

    async fn set_service_error(
        &self,
        service: ServiceId,
        messages: Vec<String>,
    ) -> Result<(), CatalogError> {
        let mut data = self.data.write().await;
        let entry = data
            .services
            .get_mut(&service)
            .ok_or_else(|| CatalogError::ServiceNotFound(service.to_string()))?;
        entry.status = ServiceStatus::Error;
        entry.error_details = messages;
        data.error_updates += 1;
        Ok(())
    }
}
