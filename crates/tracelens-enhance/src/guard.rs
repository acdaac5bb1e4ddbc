//! Shared rate-limit flag and per-service failure killswitch.
//!
//! Both live in the shared store so every worker sees them. Reads and writes
//! are not locked against each other: two callers can both pass [`check`]
//! just before the flag is set and each make one more request.
//!
//! [`check`]: RateLimitGuard::check

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracelens_state::KvBackend;
use tracing::{debug, error, warn};

use crate::catalog::{Service, ServiceCatalog, ServiceStatus};
use crate::config::GuardConfig;
use crate::error::FetchError;
use crate::host::RateInfo;

/// Diagnostic stored on a service disabled by the killswitch.
pub const KILLSWITCH_MESSAGE: &str =
    "Too many errors enhancing errors - Check service configuration.";

const RATE_LIMIT_KEY_PREFIX: &str = "github-rate-limited:";
const FAILURE_KEY_PREFIX: &str = "service-enhance-errors:";
const DISABLED_KEY_PREFIX: &str = "service-disabled:";
const MIN_FLAG_TTL: Duration = Duration::from_secs(1);

/// Persistence action produced when a service crosses the failure threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisableService {
    pub messages: Vec<String>,
}

/// Decides the service status after a failure has been counted.
///
/// A healthy service at or above `threshold` failures is disabled. Callers
/// holding a stale healthy snapshot get the action again;
/// [`RateLimitGuard::record_failure`] makes sure only one of them persists it.
#[must_use]
pub fn health_transition(
    status: ServiceStatus,
    failures: i64,
    threshold: u32,
) -> (ServiceStatus, Option<DisableService>) {
    match status {
        ServiceStatus::Healthy if failures >= i64::from(threshold) => (
            ServiceStatus::Error,
            Some(DisableService {
                messages: vec![KILLSWITCH_MESSAGE.to_owned()],
            }),
        ),
        status => (status, None),
    }
}

/// Gatekeeper consulted around every hosting-API request.
pub struct RateLimitGuard {
    kv: Arc<dyn KvBackend>,
    catalog: Arc<dyn ServiceCatalog>,
    config: GuardConfig,
}

impl RateLimitGuard {
    pub fn new(
        kv: Arc<dyn KvBackend>,
        catalog: Arc<dyn ServiceCatalog>,
        config: GuardConfig,
    ) -> Self {
        Self {
            kv,
            catalog,
            config,
        }
    }

    /// Fails with [`FetchError::RateLimited`] while the flag for `repo` is set.
    ///
    /// An unreachable store does not block requests.
    pub async fn check(&self, repo: &str) -> Result<(), FetchError> {
        match self.kv.exists(&rate_limit_key(repo)).await {
            Ok(true) => {
                debug!(repo, "rate limit flag set, skipping request");
                Err(FetchError::RateLimited {
                    repo: repo.to_owned(),
                })
            }
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(repo, error = %e, "failed to read rate limit flag");
                Ok(())
            }
        }
    }

    /// Sets the flag for `repo` when the host reported zero remaining quota.
    pub async fn observe(&self, repo: &str, rate: &RateInfo) {
        if !rate.is_exhausted() {
            return;
        }

        let ttl = self.flag_ttl(rate.reset_at, Utc::now());
        warn!(repo, ttl_secs = ttl.as_secs(), "hosting API rate limit hit");
        if let Err(e) = self.kv.put(&rate_limit_key(repo), b"1", Some(ttl)).await {
            warn!(repo, error = %e, "failed to set rate limit flag");
        }
    }

    /// Counts a failed fetch against `service` and disables it at the
    /// threshold.
    ///
    /// Returns the service status after the failure. The first caller to
    /// claim the `service-disabled:{id}` marker persists the transition; if
    /// that fails the marker is released so the next failure retries.
    /// Failing to persist is the only error; a store failure while counting
    /// is logged and the failure goes uncounted.
    pub async fn record_failure(&self, service: &Service) -> Result<ServiceStatus, FetchError> {
        let key = failure_key(service);
        let failures = match self
            .kv
            .incr(&key, Some(self.config.failure_window()))
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(service_id = %service.id, error = %e, "failed to count fetch failure");
                return Ok(service.status);
            }
        };

        let (status, action) =
            health_transition(service.status, failures, self.config.failure_threshold);
        let Some(DisableService { messages }) = action else {
            debug!(service_id = %service.id, failures, "fetch failure counted");
            return Ok(status);
        };

        let marker = disabled_key(service);
        match self
            .kv
            .put_if_absent(&marker, b"1", Some(self.config.failure_window()))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(service_id = %service.id, failures, "service already disabled");
                return Ok(status);
            }
            Err(e) => {
                warn!(service_id = %service.id, error = %e, "failed to claim disable marker");
            }
        }

        error!(
            service_id = %service.id,
            service = %service.name,
            failures,
            "too many enhancement failures, disabling service"
        );
        if let Err(source) = self.catalog.set_service_error(service.id, messages).await {
            if let Err(e) = self.kv.delete(&marker).await {
                warn!(service_id = %service.id, error = %e, "failed to release disable marker");
            }
            return Err(FetchError::KillswitchPersist {
                service: service.id.to_string(),
                source,
            });
        }
        Ok(status)
    }

    /// Flag lifetime: the configured bound, shortened to the host's reset time.
    fn flag_ttl(&self, reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
        let bound = self.config.rate_limit_ttl();
        let until_reset = reset_at
            .and_then(|reset| (reset - now).to_std().ok())
            .unwrap_or(bound);
        bound.min(until_reset).max(MIN_FLAG_TTL)
    }
}

fn rate_limit_key(repo: &str) -> String {
    format!("{RATE_LIMIT_KEY_PREFIX}{repo}")
}

fn failure_key(service: &Service) -> String {
    format!("{FAILURE_KEY_PREFIX}{}", service.id)
}

fn disabled_key(service: &Service) -> String {
    format!("{DISABLED_KEY_PREFIX}{}", service.id)
}
