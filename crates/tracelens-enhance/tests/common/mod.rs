//! Common test utilities for enhancement integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracelens_enhance::catalog::{
    IntegrationKind, MemoryCatalog, ProjectId, Service, ServiceCatalog, ServiceId,
    SystemConfiguration, Workspace, WorkspaceId,
};
use tracelens_enhance::config::EnhanceConfig;
use tracelens_enhance::error::{CatalogError, HostError};
use tracelens_enhance::host::{Blob, Commit, FileContent, HostClientFactory, RateInfo, SourceHost};
use tracelens_enhance::{EnhanceRequest, Enhancer};
use tracelens_state::{KvBackend, KvError, MemoryKv};

pub const PROJECT: i64 = 10;
pub const SERVICE: i64 = 1;
pub const WORKSPACE: i64 = 100;
pub const REPO: &str = "acme/api";
pub const HEAD_COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

/// A request recorded by [`FakeHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Contents { path: String, revision: String },
    Blob { sha: String },
    LatestCommit,
}

#[derive(Debug, Clone)]
enum FakeFile {
    Inline(String),
    Large { sha: String, content: String },
    Fail { status: u16, rate: RateInfo },
}

/// Scripted hosting API that records every request.
///
/// Unknown paths answer 404.
#[derive(Default)]
pub struct FakeHost {
    files: HashMap<String, FakeFile>,
    cancel_on_fetch: Option<CancellationToken>,
    commit_rate: RateInfo,
    calls: Mutex<Vec<HostCall>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `text` inline.
    pub fn with_file(mut self, path: &str, text: &str) -> Self {
        self.files
            .insert(path.to_string(), FakeFile::Inline(encode(text)));
        self
    }

    /// Serves `content` as-is, without encoding it.
    pub fn with_raw_file(mut self, path: &str, content: &str) -> Self {
        self.files
            .insert(path.to_string(), FakeFile::Inline(content.to_string()));
        self
    }

    /// Serves `text` only through the blob endpoint.
    pub fn with_large_file(mut self, path: &str, sha: &str, text: &str) -> Self {
        self.files.insert(
            path.to_string(),
            FakeFile::Large {
                sha: sha.to_string(),
                content: encode(text),
            },
        );
        self
    }

    /// Answers requests for `path` with an error status.
    pub fn with_failure(mut self, path: &str, status: u16) -> Self {
        self.files.insert(
            path.to_string(),
            FakeFile::Fail {
                status,
                rate: RateInfo::default(),
            },
        );
        self
    }

    /// Answers requests for `path` with a 403 reporting no quota left.
    pub fn with_exhausted_quota(mut self, path: &str) -> Self {
        self.files.insert(
            path.to_string(),
            FakeFile::Fail {
                status: 403,
                rate: RateInfo::exhausted(),
            },
        );
        self
    }

    /// Reports zero remaining quota with the default branch head.
    pub fn commit_spends_last_unit(mut self) -> Self {
        self.commit_rate = RateInfo::exhausted();
        self
    }

    /// Cancels `token` as soon as the first file is requested.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_fetch = Some(token);
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn contents_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, HostCall::Contents { .. }))
            .count()
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SourceHost for FakeHost {
    async fn file_content(
        &self,
        repo: &str,
        path: &str,
        revision: &str,
    ) -> Result<Option<FileContent>, HostError> {
        self.record(HostCall::Contents {
            path: path.to_string(),
            revision: revision.to_string(),
        });
        if let Some(token) = &self.cancel_on_fetch {
            token.cancel();
        }

        match self.files.get(path) {
            Some(FakeFile::Inline(content)) => Ok(Some(FileContent {
                content: content.clone(),
                sha: Some(format!("sha-{path}")),
                rate: RateInfo::default(),
            })),
            Some(FakeFile::Large { sha, .. }) => Ok(Some(FileContent {
                content: String::new(),
                sha: Some(sha.clone()),
                rate: RateInfo::default(),
            })),
            Some(FakeFile::Fail { status, rate }) => Err(HostError::Status {
                url: format!("/repos/{repo}/contents/{path}"),
                status: *status,
                message: "scripted failure".to_string(),
                rate: *rate,
            }),
            None => Err(HostError::Status {
                url: format!("/repos/{repo}/contents/{path}"),
                status: 404,
                message: "Not Found".to_string(),
                rate: RateInfo::default(),
            }),
        }
    }

    async fn blob(&self, repo: &str, sha: &str) -> Result<Blob, HostError> {
        self.record(HostCall::Blob {
            sha: sha.to_string(),
        });

        self.files
            .values()
            .find_map(|file| match file {
                FakeFile::Large { sha: s, content } if s == sha => Some(Blob {
                    content: content.clone(),
                    rate: RateInfo::default(),
                }),
                _ => None,
            })
            .ok_or_else(|| HostError::Status {
                url: format!("/repos/{repo}/git/blobs/{sha}"),
                status: 404,
                message: "Not Found".to_string(),
                rate: RateInfo::default(),
            })
    }

    async fn latest_commit(&self, _repo: &str) -> Result<Commit, HostError> {
        self.record(HostCall::LatestCommit);
        Ok(Commit {
            sha: HEAD_COMMIT.to_string(),
            rate: self.commit_rate,
        })
    }
}

/// Hands out the same [`FakeHost`] for every token.
pub struct FakeHostFactory(pub Arc<FakeHost>);

impl HostClientFactory for FakeHostFactory {
    fn connect(&self, _token: &SecretString) -> Result<Arc<dyn SourceHost>, HostError> {
        Ok(self.0.clone())
    }
}

/// Catalog whose service lookups always fail.
pub struct UnreachableCatalog;

#[async_trait]
impl ServiceCatalog for UnreachableCatalog {
    async fn find_service(
        &self,
        _project: ProjectId,
        _name: &str,
    ) -> Result<Option<Service>, CatalogError> {
        Err(CatalogError::Backend("connection refused".to_string()))
    }

    async fn workspace_for_project(
        &self,
        _project: ProjectId,
    ) -> Result<Option<Workspace>, CatalogError> {
        Err(CatalogError::Backend("connection refused".to_string()))
    }

    async fn access_token(
        &self,
        _workspace: &Workspace,
        _kind: IntegrationKind,
    ) -> Result<Option<SecretString>, CatalogError> {
        Err(CatalogError::Backend("connection refused".to_string()))
    }

    async fn system_configuration(&self) -> Result<SystemConfiguration, CatalogError> {
        Err(CatalogError::Backend("connection refused".to_string()))
    }

    async fn set_service_error(
        &self,
        _service: ServiceId,
        _messages: Vec<String>,
    ) -> Result<(), CatalogError> {
        Err(CatalogError::Backend("connection refused".to_string()))
    }
}

/// Store whose every operation fails, as when the server is down.
pub struct UnreachableKv;

fn refused() -> KvError {
    KvError::Connection("connection refused".to_string())
}

#[async_trait]
impl KvBackend for UnreachableKv {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Err(refused())
    }

    async fn put(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> Result<(), KvError> {
        Err(refused())
    }

    async fn put_if_absent(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Option<Duration>,
    ) -> Result<bool, KvError> {
        Err(refused())
    }

    async fn delete(&self, _key: &str) -> Result<bool, KvError> {
        Err(refused())
    }

    async fn exists(&self, _key: &str) -> Result<bool, KvError> {
        Err(refused())
    }

    async fn incr(&self, _key: &str, _window: Option<Duration>) -> Result<i64, KvError> {
        Err(refused())
    }
}

/// Catalog holding [`default_service`], its workspace and a GitHub token.
pub async fn configured_catalog() -> MemoryCatalog {
    let catalog = MemoryCatalog::new();
    catalog.insert_service(default_service()).await;
    catalog
        .insert_workspace(
            ProjectId(PROJECT),
            Workspace {
                id: WorkspaceId(WORKSPACE),
            },
        )
        .await;
    catalog
        .insert_token(WorkspaceId(WORKSPACE), IntegrationKind::GitHub, "ghp_test")
        .await;
    catalog
}

/// Enhancer wired to in-memory collaborators.
pub struct TestEnhancer {
    pub kv: Arc<MemoryKv>,
    pub catalog: MemoryCatalog,
    pub host: Arc<FakeHost>,
    pub enhancer: Enhancer,
}

impl TestEnhancer {
    /// Creates an enhancer with default configuration and a fully set up
    /// service.
    pub async fn new(host: FakeHost) -> Self {
        Self::with_config(host, EnhanceConfig::default()).await
    }

    pub async fn with_config(host: FakeHost, config: EnhanceConfig) -> Self {
        Self::with_catalog(host, config, configured_catalog().await)
    }

    /// Creates an enhancer over an empty catalog.
    pub fn bare(host: FakeHost, config: EnhanceConfig) -> Self {
        Self::with_catalog(host, config, MemoryCatalog::new())
    }

    fn with_catalog(host: FakeHost, config: EnhanceConfig, catalog: MemoryCatalog) -> Self {
        let kv = Arc::new(MemoryKv::new());
        let host = Arc::new(host);
        let enhancer = Enhancer::new(
            &config,
            kv.clone(),
            Arc::new(catalog.clone()),
            Arc::new(FakeHostFactory(host.clone())),
        );

        Self {
            kv,
            catalog,
            host,
            enhancer,
        }
    }
}

/// The service every [`TestEnhancer`] is set up with. Runtime paths start
/// with `/build/`, repository paths with `src/`.
pub fn default_service() -> Service {
    Service::new(SERVICE, PROJECT, "api")
        .with_repo(REPO)
        .with_build_prefix("/build/")
        .with_repo_prefix("src/")
}

pub fn request(raw_trace: String, version: &str) -> EnhanceRequest {
    EnhanceRequest {
        raw_trace,
        project_id: ProjectId(PROJECT),
        error_object_id: Some(42),
        service_name: "api".to_string(),
        service_version: version.to_string(),
    }
}

/// JSON frame list with one frame per `(file, line)`.
pub fn json_trace(frames: &[(&str, i64)]) -> String {
    let frames: Vec<serde_json::Value> = frames
        .iter()
        .map(|(file, line)| {
            serde_json::json!({
                "fileName": file,
                "lineNumber": line,
                "functionName": format!("fn_{line}"),
                "error": "boom",
            })
        })
        .collect();
    serde_json::Value::Array(frames).to_string()
}

/// `count` lines reading `line 1`, `line 2`, ...
pub fn source(count: usize) -> String {
    (1..=count)
        .map(|n| format!("line {n}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn encode(text: &str) -> String {
    STANDARD.encode(text)
}
