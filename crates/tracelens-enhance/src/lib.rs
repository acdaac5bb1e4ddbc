//! Stack trace enhancement with repository source context.
//!
//! Given a captured stack trace and the service and version that produced
//! it, [`Enhancer`] fetches the files of the top frames from the hosted
//! repository at the matching commit and attaches the surrounding lines.
//!
//! # Pipeline
//!
//! ```text
//! raw trace ──▶ StackTraceParser ──▶ service / workspace / token lookups
//!                                              │
//!                                              ▼
//!                                     RevisionResolver (once per call)
//!                                              │
//!            ┌─────────────────────────────────┘
//!            ▼            per frame, up to max_depth
//!   repository_path ──▶ ContentFetcher ──▶ decode_content ──▶ extract_context
//!                            │
//!                            ▼
//!                     RateLimitGuard
//! ```
//!
//! Cross-call state (content cache, resolved revisions, the rate-limit flag
//! and per-service failure counters) lives in a [`tracelens_state::KvBackend`]
//! shared by every worker. A service whose fetches keep failing is moved to
//! [`ServiceStatus::Error`] through the [`ServiceCatalog`] and is skipped
//! until the platform re-enables it.

pub mod catalog;
pub mod config;
pub mod enhancer;
pub mod error;
pub mod fetch;
pub mod frame;
pub mod guard;
pub mod host;
pub mod parse;
pub mod path;
pub mod revision;
pub mod window;

pub use catalog::{
    IntegrationKind, MemoryCatalog, ProjectId, Service, ServiceCatalog, ServiceId, ServiceStatus,
    SystemConfiguration, Workspace, WorkspaceId,
};
pub use config::EnhanceConfig;
pub use enhancer::{
    EnhanceRequest, EnhancedTrace, EnhancementOutcome, Enhancer, FrameOutcome, SkipReason,
    UnchangedReason,
};
pub use error::{
    CatalogError, DecodeError, EnhanceError, EnhanceResult, FetchError, HostError, StructureError,
};
pub use fetch::{decode_content, ContentFetcher};
pub use frame::Frame;
pub use guard::{health_transition, DisableService, RateLimitGuard};
pub use host::{
    Blob, Commit, FileContent, GitHubClient, GitHubClientFactory, HostClientFactory, RateInfo,
    SourceHost,
};
pub use parse::{StackTraceParser, TextTraceStructurer, TraceStructurer};
pub use path::repository_path;
pub use revision::{literal_revision, RevisionResolver};
pub use window::{extract_context, ContextWindow};
