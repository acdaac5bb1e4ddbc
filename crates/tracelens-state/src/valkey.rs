//! Valkey/Redis store shared by every worker.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, ErrorKind, RedisError, Script};

use crate::error::KvError;
use crate::traits::KvBackend;

/// Increments `KEYS[1]`, setting `ARGV[1]` seconds of expiry when the
/// increment created it. `ARGV[1] = 0` means no expiry.
#[allow(clippy::incompatible_msrv)]
static INCR_IN_WINDOW: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local count = redis.call('INCR', KEYS[1])
        local window = tonumber(ARGV[1])
        if count == 1 and window > 0 then
            redis.call('EXPIRE', KEYS[1], window)
        end
        return count
        ",
    )
});

fn backend(e: RedisError) -> KvError {
    KvError::Backend(e.to_string())
}

/// Whole seconds, at least one; Valkey rejects a zero expiry.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Valkey/Redis backend over a connection pool.
///
/// Every key is stored as `{namespace}:{key}` when a namespace is set, so
/// several deployments can share one server.
#[derive(Clone)]
pub struct ValkeyKv {
    pool: Pool,
    namespace: Option<String>,
}

impl ValkeyKv {
    /// Connects and verifies the server answers `PING`.
    pub async fn new(
        url: &str,
        namespace: Option<String>,
        pool_size: usize,
    ) -> Result<Self, KvError> {
        let pool = Config::from_url(url)
            .builder()
            .map_err(|e| KvError::Connection(e.to_string()))?
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| KvError::Connection(e.to_string()))?;

        let kv = Self { pool, namespace };
        let mut conn = kv.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?;

        Ok(kv)
    }

    async fn conn(&self) -> Result<Connection, KvError> {
        self.pool
            .get()
            .await
            .map_err(|e| KvError::Connection(e.to_string()))
    }

    fn key(&self, key: &str) -> String {
        self.namespace
            .as_deref()
            .map_or_else(|| key.to_owned(), |ns| format!("{ns}:{key}"))
    }
}

#[async_trait]
impl KvBackend for ValkeyKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.conn().await?.get(self.key(key)).await.map_err(backend)
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        let key = self.key(key);
        match ttl {
            Some(ttl) => conn.set_ex(key, value, expiry_secs(ttl)).await,
            None => conn.set(key, value).await,
        }
        .map_err(backend)
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(expiry_secs(ttl));
        }
        let reply: Option<String> = cmd.query_async(&mut *conn).await.map_err(backend)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let removed: i64 = self.conn().await?.del(self.key(key)).await.map_err(backend)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        self.conn()
            .await?
            .exists(self.key(key))
            .await
            .map_err(backend)
    }

    async fn incr(&self, key: &str, window: Option<Duration>) -> Result<i64, KvError> {
        let mut conn = self.conn().await?;
        INCR_IN_WINDOW
            .key(self.key(key))
            .arg(window.map_or(0, expiry_secs))
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::ResponseError => KvError::NotAnInteger {
                    key: key.to_owned(),
                },
                _ => backend(e),
            })
    }
}

impl std::fmt::Debug for ValkeyKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyKv")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
