use std::time::Duration;

use async_trait::async_trait;

use crate::error::KvError;

/// Key/value store shared between every process running the pipeline.
///
/// Implementations must make `incr` and `put_if_absent` atomic across callers. Nothing else is
/// locked: readers may observe a value that another caller is about to
/// overwrite.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), KvError>;

    /// Stores `value` only when `key` holds no live value. Returns whether it
    /// was stored.
    async fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool, KvError>;

    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Atomically increments the integer at `key` and returns the new value.
    ///
    /// A missing key starts at zero. `window` is applied only when the
    /// increment creates the key, so a counter expires a fixed time after its
    /// first increment.
    async fn incr(&self, key: &str, window: Option<Duration>) -> Result<i64, KvError>;
}
