use std::sync::Arc;

use crate::config::KvConfig;
use crate::error::StateError;
use crate::traits::KvBackend;

#[cfg(feature = "memory")]
use crate::memory::MemoryKv;

#[cfg(feature = "valkey")]
use crate::valkey::ValkeyKv;

/// Owns the store handle shared by the enrichment components.
#[derive(Clone, Default)]
pub struct StateProvider {
    kv: Option<Arc<dyn KvBackend>>,
}

impl StateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the backend named by `config`.
    pub async fn from_config(config: &KvConfig) -> Result<Self, StateError> {
        Ok(Self {
            kv: Some(connect(config).await?),
        })
    }

    pub fn with_kv(mut self, kv: Arc<dyn KvBackend>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn kv(&self) -> Result<Arc<dyn KvBackend>, StateError> {
        self.kv
            .clone()
            .ok_or_else(|| StateError::NotConfigured("kv".to_string()))
    }
}

async fn connect(config: &KvConfig) -> Result<Arc<dyn KvBackend>, StateError> {
    match config {
        #[cfg(feature = "memory")]
        KvConfig::Memory => {
            tracing::warn!("Using in-memory store; cache and rate-limit state is per-process");
            Ok(Arc::new(MemoryKv::new()))
        }

        #[cfg(feature = "valkey")]
        KvConfig::Valkey {
            url,
            namespace,
            pool_size,
        } => {
            let kv = ValkeyKv::new(url, namespace.clone(), *pool_size)
                .await
                .map_err(|e| StateError::Connection(e.to_string()))?;
            tracing::info!(pool_size, namespace = ?namespace, "Connected to Valkey store");
            Ok(Arc::new(kv))
        }

        #[allow(unreachable_patterns)]
        _ => Err(StateError::UnsupportedBackend(format!(
            "{config:?} (crate feature not enabled)"
        ))),
    }
}

impl std::fmt::Debug for StateProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateProvider")
            .field("kv", &self.kv.is_some())
            .finish()
    }
}
