//! Error types for the enhancement pipeline.
//!
//! Only [`EnhanceError`] ever reaches the caller. [`FetchError`] and
//! [`DecodeError`] describe why a single frame was left unenhanced and are
//! absorbed by the orchestrator.

use thiserror::Error;
use tracelens_state::StateError;

use crate::host::RateInfo;

/// Result alias for call-level operations.
pub type EnhanceResult<T> = Result<T, EnhanceError>;

/// Failures that abort a whole enhancement call.
#[derive(Debug, Error)]
pub enum EnhanceError {
    /// The trace was neither JSON frames nor a recognisable text trace.
    #[error("failed to parse stack trace: {message}")]
    Parse {
        /// The unmodified input.
        raw: String,
        /// Why both parsing strategies failed.
        message: String,
    },

    /// Service, workspace, token or system configuration lookup failed.
    #[error("lookup failed: {0}")]
    Lookup(#[from] CatalogError),

    /// The hosting-API client could not be built.
    #[error("failed to create hosting client: {0}")]
    Client(HostError),

    /// The service version could not be resolved to a commit.
    #[error("failed to resolve revision: {0}")]
    Revision(FetchError),

    /// The enhanced trace could not be serialised.
    #[error("failed to serialise trace: {0}")]
    Serialise(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The shared store could not be set up.
    #[error("state backend error: {0}")]
    State(#[from] StateError),
}

/// Errors reported by the configuration/identity store.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog backend error: {0}")]
    Backend(String),

    #[error("service {0} not found")]
    ServiceNotFound(String),
}

/// Errors reported by the hosting API.
#[derive(Debug, Error)]
pub enum HostError {
    /// The request never produced a response.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status.
    #[error("{url} returned {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
        /// Quota headers seen on the failing response.
        rate: RateInfo,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The repository path is not `owner/name`.
    #[error("invalid repository path: {0}")]
    InvalidRepository(String),

    /// The repository has no commits on its default branch.
    #[error("no commits found in {0}")]
    NoCommits(String),

    /// The HTTP client could not be constructed.
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl HostError {
    /// Quota information attached to the failing response, if any.
    #[must_use]
    pub const fn rate(&self) -> Option<&RateInfo> {
        match self {
            Self::Status { rate, .. } => Some(rate),
            _ => None,
        }
    }
}

/// Why fetching a frame's source failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The rate-limit flag is set; no request was made.
    #[error("hosting API rate limit exceeded for {repo}")]
    RateLimited { repo: String },

    #[error(transparent)]
    Host(#[from] HostError),

    /// The API answered but returned no file.
    #[error("hosting API returned empty content for {path} in {repo}")]
    EmptyContent { repo: String, path: String },

    /// The caller cancelled the enhancement.
    #[error("enhancement cancelled")]
    Cancelled,

    /// The service crossed the failure threshold but the error state could
    /// not be saved.
    #[error("failed to disable service {service}: {source}")]
    KillswitchPersist {
        service: String,
        #[source]
        source: CatalogError,
    },
}

/// Why fetched bytes could not be turned into source lines.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 content: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("content is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("decoded content is empty")]
    Empty,
}

/// Why the text fallback found no frames.
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("no stack frames recognised")]
    NoFrames,

    #[error("frame patterns failed to compile")]
    Patterns,
}
