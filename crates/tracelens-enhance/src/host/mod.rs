//! Hosting-API contract.
//!
//! The pipeline talks to the repository host through [`SourceHost`]; a
//! [`HostClientFactory`] builds an authenticated client per call from the
//! workspace's access token.

mod github;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

use crate::error::HostError;

pub use github::{GitHubClient, GitHubClientFactory};

/// Quota state reported with an API response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateInfo {
    /// Requests left in the current window.
    pub remaining: Option<u32>,
    /// When the window resets.
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateInfo {
    #[must_use]
    pub const fn exhausted() -> Self {
        Self {
            remaining: Some(0),
            reset_at: None,
        }
    }

    /// True when the host reported zero remaining quota.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self.remaining, Some(0))
    }
}

/// Response of the inline contents endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// Base64 file content; empty when the file is too large to inline.
    pub content: String,
    /// Blob hash of the file.
    pub sha: Option<String>,
    pub rate: RateInfo,
}

impl FileContent {
    /// The contents endpoint leaves `content` empty for large files but still
    /// returns the blob hash to fetch them with.
    #[must_use]
    pub fn needs_blob_fetch(&self) -> bool {
        self.content.is_empty() && self.sha.is_some()
    }
}

/// Response of the blob endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Base64 blob content.
    pub content: String,
    pub rate: RateInfo,
}

/// Head commit of a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
    pub rate: RateInfo,
}

/// Read access to a hosted Git repository.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Fetches a file at a revision through the inline contents endpoint.
    ///
    /// `Ok(None)` means the host answered without a file (for example the
    /// path is a directory).
    async fn file_content(
        &self,
        repo: &str,
        path: &str,
        revision: &str,
    ) -> Result<Option<FileContent>, HostError>;

    /// Fetches a blob by hash.
    async fn blob(&self, repo: &str, sha: &str) -> Result<Blob, HostError>;

    /// Head commit of the repository's default branch.
    async fn latest_commit(&self, repo: &str) -> Result<Commit, HostError>;
}

/// Builds an authenticated [`SourceHost`] from an access token.
pub trait HostClientFactory: Send + Sync {
    fn connect(&self, token: &SecretString) -> Result<Arc<dyn SourceHost>, HostError>;
}
