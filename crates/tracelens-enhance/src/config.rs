//! Configuration for the enhancement pipeline.

use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use tracelens_state::{CachePolicy, KvConfig};

use crate::error::EnhanceError;
use crate::window::DEFAULT_CONTEXT_LINES;

// ============================================================================
// Default configuration constants
// ============================================================================

/// Default number of frames, counted from the top, that are enhanced.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Default number of fetch failures after which a service is disabled.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 20;

/// Default upper bound on how long the rate-limit flag stays set.
pub const DEFAULT_RATE_LIMIT_TTL_SECS: u64 = 60;

/// Default window over which fetch failures are counted.
pub const DEFAULT_FAILURE_WINDOW_SECS: u64 = 60 * 60;

/// Default age after which a resolved revision is refreshed.
pub const DEFAULT_REVISION_SOFT_TTL_SECS: u64 = 5;

/// Default age after which a resolved revision is never served.
pub const DEFAULT_REVISION_HARD_TTL_SECS: u64 = 24 * 60 * 60;

/// Default GitHub API root.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Default hosting-API request timeout.
pub const DEFAULT_GITHUB_TIMEOUT_SECS: u64 = 10;

/// Default `User-Agent` sent to the hosting API.
pub const DEFAULT_USER_AGENT: &str = concat!("tracelens/", env!("CARGO_PKG_VERSION"));

/// Pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    pub enhancement: EnhancementConfig,
    pub guard: GuardConfig,
    pub revision: RevisionConfig,
    pub github: GitHubConfig,
    pub state: StateConfig,
}

impl EnhanceConfig {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order (later sources override earlier):
    /// 1. Default values
    /// 2. `tracelens.toml` in current directory
    /// 3. Environment variables prefixed with `TRACELENS_`, with `__`
    ///    separating nested keys (`TRACELENS_GUARD__FAILURE_THRESHOLD`)
    pub fn load() -> Result<Self, EnhanceError> {
        Self::load_from("tracelens.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &str) -> Result<Self, EnhanceError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TRACELENS_").split("__"))
            .extract()
            .map_err(|e| EnhanceError::Config(e.to_string()))
    }
}

/// Per-call traversal limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Frames beyond this depth are returned untouched.
    pub max_depth: usize,
    /// Lines shown on each side of the target line.
    pub context_lines: usize,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }
}

/// Rate-limit flag and killswitch settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Failures within the window that disable a service.
    pub failure_threshold: u32,
    /// Maximum lifetime of the rate-limit flag.
    ///
    /// Shortened to the host's reported reset time when that is sooner.
    pub rate_limit_ttl_secs: u64,
    /// Failures older than this stop counting.
    pub failure_window_secs: u64,
}

impl GuardConfig {
    #[must_use]
    pub const fn rate_limit_ttl(&self) -> Duration {
        Duration::from_secs(self.rate_limit_ttl_secs)
    }

    #[must_use]
    pub const fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            rate_limit_ttl_secs: DEFAULT_RATE_LIMIT_TTL_SECS,
            failure_window_secs: DEFAULT_FAILURE_WINDOW_SECS,
        }
    }
}

/// Caching of version-to-commit resolution.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RevisionConfig {
    pub soft_ttl_secs: u64,
    pub hard_ttl_secs: u64,
}

impl RevisionConfig {
    #[must_use]
    pub const fn cache_policy(&self) -> CachePolicy {
        CachePolicy::new(
            Duration::from_secs(self.soft_ttl_secs),
            Duration::from_secs(self.hard_ttl_secs),
        )
    }
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            soft_ttl_secs: DEFAULT_REVISION_SOFT_TTL_SECS,
            hard_ttl_secs: DEFAULT_REVISION_HARD_TTL_SECS,
        }
    }
}

/// GitHub API client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// API root; override for GitHub Enterprise.
    pub api_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GITHUB_API_URL.to_owned(),
            timeout_secs: DEFAULT_GITHUB_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

/// Shared store backend.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub kv: KvConfig,
}
