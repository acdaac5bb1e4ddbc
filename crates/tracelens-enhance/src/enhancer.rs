//! End-to-end enhancement of one error event.

use std::sync::Arc;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracelens_state::{KvBackend, StateProvider};
use tracing::{debug, info, instrument, warn};

use crate::catalog::{IntegrationKind, ProjectId, Service, ServiceCatalog, ServiceStatus};
use crate::config::{EnhanceConfig, EnhancementConfig};
use crate::error::{EnhanceError, EnhanceResult, FetchError};
use crate::fetch::{decode_content, ContentFetcher};
use crate::frame::Frame;
use crate::guard::RateLimitGuard;
use crate::host::{GitHubClientFactory, HostClientFactory, SourceHost};
use crate::parse::StackTraceParser;
use crate::path::repository_path;
use crate::revision::RevisionResolver;
use crate::window::extract_context;

/// One captured error to enhance.
#[derive(Debug, Clone)]
pub struct EnhanceRequest {
    /// JSON frame list or plain-text trace.
    pub raw_trace: String,
    pub project_id: ProjectId,
    /// Error object the trace belongs to, recorded on the tracing span.
    pub error_object_id: Option<i64>,
    pub service_name: String,
    /// Release version or commit the service was running.
    pub service_version: String,
}

/// Why a call returned its frames without attempting enhancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoServiceName,
    ServiceNotFound,
    NoRepository,
    ServiceUnhealthy,
    NoWorkspace,
    NoAccessToken,
}

/// Why an attempted frame was left as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnchangedReason {
    /// No file name or line number.
    MissingLocation,
    /// Repository path matched an ignored-file pattern.
    Ignored,
    /// The rate-limit flag was set; nothing was requested.
    RateLimited,
    /// Fetching failed or was cancelled.
    FetchFailed,
    DecodeFailed,
    /// Line number below 1 or past the end of the file.
    LineOutOfRange,
}

/// Result for one frame, in trace order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Enhanced,
    Unchanged(UnchangedReason),
    /// Beyond the depth limit; never attempted.
    Skipped,
}

/// Frames after an enhancement pass.
#[derive(Debug, Clone)]
pub struct EnhancedTrace {
    /// Every input frame, enhanced or not, in the original order.
    pub frames: Vec<Frame>,
    /// `outcomes[i]` describes `frames[i]`.
    pub outcomes: Vec<FrameOutcome>,
    /// `frames` as a JSON array.
    pub serialized: String,
}

impl EnhancedTrace {
    #[must_use]
    pub fn enhanced_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FrameOutcome::Enhanced))
            .count()
    }
}

#[derive(Debug, Clone)]
pub enum EnhancementOutcome {
    /// Enhancement does not apply to this service; frames are as parsed.
    Skipped {
        reason: SkipReason,
        frames: Vec<Frame>,
    },
    Enhanced(EnhancedTrace),
}

impl EnhancementOutcome {
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        match self {
            Self::Skipped { frames, .. } => frames,
            Self::Enhanced(trace) => &trace.frames,
        }
    }

    #[must_use]
    pub fn into_frames(self) -> Vec<Frame> {
        match self {
            Self::Skipped { frames, .. } => frames,
            Self::Enhanced(trace) => trace.frames,
        }
    }
}

/// Per-call state shared by every frame.
struct FrameContext<'a> {
    host: &'a dyn SourceHost,
    service: &'a Service,
    repo: &'a str,
    revision: &'a str,
    ignored: &'a [Regex],
    cancel: &'a CancellationToken,
}

/// Enhances stack traces with source from the service's repository.
pub struct Enhancer {
    parser: StackTraceParser,
    catalog: Arc<dyn ServiceCatalog>,
    hosts: Arc<dyn HostClientFactory>,
    revisions: RevisionResolver,
    fetcher: ContentFetcher,
    config: EnhancementConfig,
}

impl Enhancer {
    pub fn new(
        config: &EnhanceConfig,
        kv: Arc<dyn KvBackend>,
        catalog: Arc<dyn ServiceCatalog>,
        hosts: Arc<dyn HostClientFactory>,
    ) -> Self {
        let guard = Arc::new(RateLimitGuard::new(
            kv.clone(),
            catalog.clone(),
            config.guard.clone(),
        ));

        Self {
            parser: StackTraceParser::default(),
            catalog,
            hosts,
            revisions: RevisionResolver::new(
                kv.clone(),
                guard.clone(),
                config.revision.cache_policy(),
            ),
            fetcher: ContentFetcher::new(kv, guard),
            config: config.enhancement.clone(),
        }
    }

    /// Builds the configured store backend and a GitHub client factory.
    pub async fn from_config(
        config: &EnhanceConfig,
        catalog: Arc<dyn ServiceCatalog>,
    ) -> EnhanceResult<Self> {
        let kv = StateProvider::from_config(&config.state.kv).await?.kv()?;
        let hosts = Arc::new(GitHubClientFactory::new(config.github.clone()));
        Ok(Self::new(config, kv, catalog, hosts))
    }

    #[must_use]
    pub fn with_parser(mut self, parser: StackTraceParser) -> Self {
        self.parser = parser;
        self
    }

    /// Parses and enhances one trace.
    ///
    /// Only an unparseable trace, a failed lookup, client construction or
    /// revision resolution fail the call. Every per-frame problem leaves that
    /// frame unchanged and is reported in [`EnhancedTrace::outcomes`].
    #[instrument(
        skip_all,
        fields(
            project = %request.project_id,
            service = %request.service_name,
            version = %request.service_version,
            error_object = ?request.error_object_id,
        )
    )]
    pub async fn enhance(
        &self,
        request: &EnhanceRequest,
        cancel: &CancellationToken,
    ) -> EnhanceResult<EnhancementOutcome> {
        let frames = self.parser.parse(&request.raw_trace)?;

        if request.service_name.is_empty() {
            return Ok(skipped(SkipReason::NoServiceName, frames));
        }

        let Some(service) = self
            .catalog
            .find_service(request.project_id, &request.service_name)
            .await?
        else {
            return Ok(skipped(SkipReason::ServiceNotFound, frames));
        };
        let Some(repo) = service.repo_path.as_deref() else {
            return Ok(skipped(SkipReason::NoRepository, frames));
        };
        if service.status != ServiceStatus::Healthy {
            return Ok(skipped(SkipReason::ServiceUnhealthy, frames));
        }

        let Some(workspace) = self
            .catalog
            .workspace_for_project(request.project_id)
            .await?
        else {
            return Ok(skipped(SkipReason::NoWorkspace, frames));
        };
        let Some(token) = self
            .catalog
            .access_token(&workspace, IntegrationKind::GitHub)
            .await?
        else {
            return Ok(skipped(SkipReason::NoAccessToken, frames));
        };

        let host = self.hosts.connect(&token).map_err(EnhanceError::Client)?;

        let revision = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!("revision resolution cancelled");
                return Err(EnhanceError::Revision(FetchError::Cancelled));
            }
            result = self.revisions.resolve(host.as_ref(), repo, &request.service_version) => {
                result.map_err(EnhanceError::Revision)?
            }
        };

        let system = self.catalog.system_configuration().await?;
        let ignored = compile_ignored(&system.ignored_files);

        let ctx = FrameContext {
            host: host.as_ref(),
            service: &service,
            repo,
            revision: &revision,
            ignored: &ignored,
            cancel,
        };

        let total = frames.len();
        let mut enhanced = Vec::with_capacity(total);
        let mut outcomes = Vec::with_capacity(total);
        for (depth, frame) in frames.into_iter().enumerate() {
            if depth >= self.config.max_depth {
                enhanced.push(frame);
                outcomes.push(FrameOutcome::Skipped);
                continue;
            }

            let (frame, outcome) = self.enhance_frame(&ctx, frame).await;
            enhanced.push(frame);
            outcomes.push(outcome);
        }

        let serialized = serde_json::to_string(&enhanced)?;
        let trace = EnhancedTrace {
            frames: enhanced,
            outcomes,
            serialized,
        };
        info!(
            revision = %revision,
            frames = total,
            enhanced = trace.enhanced_count(),
            "stack trace enhanced"
        );
        Ok(EnhancementOutcome::Enhanced(trace))
    }

    async fn enhance_frame(&self, ctx: &FrameContext<'_>, frame: Frame) -> (Frame, FrameOutcome) {
        let location = frame.location().map(|(file_name, line_number)| {
            let path = repository_path(
                file_name,
                ctx.service.build_prefix.as_deref(),
                ctx.service.repo_prefix.as_deref(),
            );
            (path, line_number)
        });
        let Some((path, line_number)) = location else {
            return (
                frame,
                FrameOutcome::Unchanged(UnchangedReason::MissingLocation),
            );
        };

        if ctx.ignored.iter().any(|pattern| pattern.is_match(&path)) {
            debug!(path = %path, "path matches an ignored-file pattern");
            return (frame, FrameOutcome::Unchanged(UnchangedReason::Ignored));
        }

        let fetched = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.fetcher.fetch_file_content(
                ctx.host,
                ctx.service,
                ctx.repo,
                &path,
                ctx.revision,
            ) => result,
        };
        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path, error = %e, "failed to fetch source");
                let reason = match e {
                    FetchError::RateLimited { .. } => UnchangedReason::RateLimited,
                    _ => UnchangedReason::FetchFailed,
                };
                return (frame, FrameOutcome::Unchanged(reason));
            }
        };

        let text = match decode_content(&bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path, error = %e, "failed to decode source");
                return (frame, FrameOutcome::Unchanged(UnchangedReason::DecodeFailed));
            }
        };

        let lines: Vec<&str> = text.split('\n').collect();
        let window = usize::try_from(line_number)
            .ok()
            .and_then(|line| extract_context(&lines, line, self.config.context_lines));
        match window {
            Some(window) => (frame.with_context(window), FrameOutcome::Enhanced),
            None => {
                debug!(
                    path = %path,
                    line_number,
                    lines = lines.len(),
                    "line outside of file"
                );
                (
                    frame,
                    FrameOutcome::Unchanged(UnchangedReason::LineOutOfRange),
                )
            }
        }
    }
}

fn skipped(reason: SkipReason, frames: Vec<Frame>) -> EnhancementOutcome {
    debug!(?reason, "enhancement skipped");
    EnhancementOutcome::Skipped { reason, frames }
}

/// Invalid patterns are logged and dropped.
fn compile_ignored(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "invalid ignored-file pattern");
                None
            }
        })
        .collect()
}
