//! Cached-or-compute with a soft and a hard TTL.
//!
//! Values are stored as a JSON envelope carrying the wall-clock time they were
//! computed, so every process sharing the store agrees on their age:
//!
//! - `age < soft_ttl`: served from the store.
//! - `soft_ttl <= age < hard_ttl`: recomputed; if that fails the stale value
//!   is served instead.
//! - missing, unreadable or `age >= hard_ttl`: recomputed, and a compute
//!   failure is returned to the caller.
//!
//! Store failures never fail the call. They are logged and the value is
//! computed as if the entry were missing.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::traits::KvBackend;

/// Freshness bounds for [`cached_eval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age after which a value is refreshed opportunistically.
    pub soft_ttl: Duration,
    /// Age after which a value is never served.
    pub hard_ttl: Duration,
}

impl CachePolicy {
    pub const fn new(soft_ttl: Duration, hard_ttl: Duration) -> Self {
        Self { soft_ttl, hard_ttl }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    computed_at: DateTime<Utc>,
    value: T,
}

enum Cached<T> {
    Fresh(T),
    Stale(T),
    Missing,
}

/// Returns the value cached under `key`, computing and storing it when the
/// cached copy is missing or older than the policy allows.
pub async fn cached_eval<T, E, F, Fut>(
    kv: &dyn KvBackend,
    key: &str,
    policy: CachePolicy,
    compute: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    E: Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match lookup(kv, key, policy).await {
        Cached::Fresh(value) => {
            debug!(key, "cached value is fresh");
            Ok(value)
        }
        Cached::Stale(stale) => match compute().await {
            Ok(value) => {
                store(kv, key, policy, &value).await;
                Ok(value)
            }
            Err(e) => {
                warn!(key, error = %e, "refresh failed, serving stale value");
                Ok(stale)
            }
        },
        Cached::Missing => {
            let value = compute().await?;
            store(kv, key, policy, &value).await;
            Ok(value)
        }
    }
}

async fn lookup<T: DeserializeOwned>(kv: &dyn KvBackend, key: &str, policy: CachePolicy) -> Cached<T> {
    let bytes = match kv.get(key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Cached::Missing,
        Err(e) => {
            warn!(key, error = %e, "cache read failed");
            return Cached::Missing;
        }
    };

    let envelope: Envelope<T> = match serde_json::from_slice(&bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(key, error = %e, "discarding unreadable cache entry");
            return Cached::Missing;
        }
    };

    // A clock behind the writer's yields a negative age; treat it as fresh.
    let age = (Utc::now() - envelope.computed_at)
        .to_std()
        .unwrap_or(Duration::ZERO);

    if age >= policy.hard_ttl {
        Cached::Missing
    } else if age >= policy.soft_ttl {
        Cached::Stale(envelope.value)
    } else {
        Cached::Fresh(envelope.value)
    }
}

async fn store<T: Serialize>(kv: &dyn KvBackend, key: &str, policy: CachePolicy, value: &T) {
    let envelope = Envelope {
        computed_at: Utc::now(),
        value,
    };

    let bytes = match serde_json::to_vec(&envelope) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key, error = %e, "failed to serialise cache entry");
            return;
        }
    };

    if let Err(e) = kv.put(key, &bytes, Some(policy.hard_ttl)).await {
        warn!(key, error = %e, "cache write failed");
    }
}
