//! Cache-then-network retrieval of source files.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracelens_state::KvBackend;
use tracing::{debug, warn};

use crate::catalog::Service;
use crate::error::{DecodeError, FetchError, HostError};
use crate::guard::RateLimitGuard;
use crate::host::SourceHost;

const CONTENT_KEY_PREFIX: &str = "source:";

/// Fetches base64-encoded file contents, shared-cached per path and revision.
///
/// Cached entries never expire from here; a revision's file content does not
/// change.
pub struct ContentFetcher {
    kv: Arc<dyn KvBackend>,
    guard: Arc<RateLimitGuard>,
}

impl ContentFetcher {
    pub fn new(kv: Arc<dyn KvBackend>, guard: Arc<RateLimitGuard>) -> Self {
        Self { kv, guard }
    }

    /// Returns the still-encoded content of `path` at `revision`.
    ///
    /// Hosting-API errors are counted against `service` and may disable it.
    pub async fn fetch_file_content(
        &self,
        host: &dyn SourceHost,
        service: &Service,
        repo: &str,
        path: &str,
        revision: &str,
    ) -> Result<Vec<u8>, FetchError> {
        self.guard.check(repo).await?;

        let key = content_key(path, revision);
        match self.kv.get(&key).await {
            Ok(Some(bytes)) => {
                debug!(repo, path, revision, "source served from cache");
                return Ok(bytes);
            }
            Ok(None) => {}
            Err(e) => warn!(repo, path, error = %e, "failed to read source cache"),
        }

        let content = match self.fetch_remote(host, repo, path, revision).await {
            Ok(content) => content,
            Err(e) => {
                if matches!(e, FetchError::Host(_)) {
                    self.guard.record_failure(service).await?;
                }
                return Err(e);
            }
        };

        let bytes = content.into_bytes();
        if let Err(e) = self.kv.put(&key, &bytes, None).await {
            warn!(repo, path, error = %e, "failed to cache source");
        }
        Ok(bytes)
    }

    /// Reads the file inline, falling back to the blob endpoint when the host
    /// reports the file as too large to inline.
    async fn fetch_remote(
        &self,
        host: &dyn SourceHost,
        repo: &str,
        path: &str,
        revision: &str,
    ) -> Result<String, FetchError> {
        let empty = || FetchError::EmptyContent {
            repo: repo.to_owned(),
            path: path.to_owned(),
        };

        let file = self
            .observe_error(repo, host.file_content(repo, path, revision).await)
            .await?
            .ok_or_else(empty)?;
        self.guard.observe(repo, &file.rate).await;

        let content = match (file.needs_blob_fetch(), file.sha) {
            (true, Some(sha)) => {
                debug!(repo, path, sha = %sha, "file too large to inline, fetching blob");
                let blob = self
                    .observe_error(repo, host.blob(repo, &sha).await)
                    .await?;
                self.guard.observe(repo, &blob.rate).await;
                blob.content
            }
            _ => file.content,
        };

        if content.is_empty() {
            return Err(empty());
        }
        Ok(content)
    }

    /// A failing response can still carry exhausted quota.
    async fn observe_error<T>(
        &self,
        repo: &str,
        result: Result<T, HostError>,
    ) -> Result<T, FetchError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if let Some(rate) = e.rate() {
                    self.guard.observe(repo, rate).await;
                }
                Err(FetchError::Host(e))
            }
        }
    }
}

fn content_key(path: &str, revision: &str) -> String {
    format!("{CONTENT_KEY_PREFIX}{revision}:{path}")
}

/// Decodes fetched or cached content into text.
///
/// The hosting API wraps base64 output across lines, so ASCII whitespace is
/// dropped before decoding.
pub fn decode_content(bytes: &[u8]) -> Result<String, DecodeError> {
    let compact: Vec<u8> = bytes
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    let decoded = STANDARD.decode(compact)?;
    if decoded.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(String::from_utf8(decoded)?)
}
