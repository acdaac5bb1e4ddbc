//! Maps a service version string to a commit in the hosted repository.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracelens_state::{cached_eval, CachePolicy, KvBackend};
use tracing::debug;

use crate::error::FetchError;
use crate::guard::RateLimitGuard;
use crate::host::SourceHost;

const REVISION_KEY_PREFIX: &str = "git-main-hash-";

#[allow(clippy::incompatible_msrv)]
static COMMIT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b[0-9a-f]{5,40}\b").ok());

/// Returns `version` unchanged when it contains a standalone hex token of 5
/// to 40 characters, i.e. when it already names a commit.
#[must_use]
pub fn literal_revision(version: &str) -> Option<&str> {
    COMMIT_PATTERN
        .as_ref()?
        .is_match(version)
        .then_some(version)
}

/// Resolves versions, caching default-branch lookups per repository.
pub struct RevisionResolver {
    kv: Arc<dyn KvBackend>,
    guard: Arc<RateLimitGuard>,
    policy: CachePolicy,
}

impl RevisionResolver {
    pub fn new(kv: Arc<dyn KvBackend>, guard: Arc<RateLimitGuard>, policy: CachePolicy) -> Self {
        Self { kv, guard, policy }
    }

    /// Commit to fetch sources at for `version` of `repo`.
    ///
    /// Literal commits never touch the cache or the host. Anything else
    /// resolves to the head of the default branch.
    pub async fn resolve(
        &self,
        host: &dyn SourceHost,
        repo: &str,
        version: &str,
    ) -> Result<String, FetchError> {
        if let Some(revision) = literal_revision(version) {
            debug!(repo, revision, "version is a literal commit");
            return Ok(revision.to_owned());
        }

        let key = format!("{REVISION_KEY_PREFIX}{repo}");
        cached_eval(self.kv.as_ref(), &key, self.policy, || async {
            self.guard.check(repo).await?;
            match host.latest_commit(repo).await {
                Ok(commit) => {
                    debug!(repo, version, sha = %commit.sha, "resolved default branch head");
                    self.guard.observe(repo, &commit.rate).await;
                    Ok(commit.sha)
                }
                Err(e) => {
                    if let Some(rate) = e.rate() {
                        self.guard.observe(repo, rate).await;
                    }
                    Err(FetchError::from(e))
                }
            }
        })
        .await
    }
}
