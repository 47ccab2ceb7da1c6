//! Building stores from configuration.

use crate::in_memory::{InMemoryDurableStore, InMemoryHotStore};
use crate::noop::NoopHotStore;
use crate::orchestrator::MemoryOrchestrator;
use convmem_config::{AppConfig, DurableStoreConfig, HotStoreConfig};
use convmem_core::error::{DurableError, HotStoreError};
use convmem_core::memory::{DurableStore, HotStore};
use convmem_core::provider::Summarizer;
use std::sync::Arc;
use tracing::{info, warn};

/// Open the configured hot store.
///
/// An unreachable Redis falls back to the in-memory store when
/// `fallback_to_memory` is set.
pub async fn open_hot_store(config: &HotStoreConfig) -> Result<Arc<dyn HotStore>, HotStoreError> {
    match config.backend.as_str() {
        "memory" => {
            info!("Using in-memory hot store");
            Ok(Arc::new(InMemoryHotStore::new()))
        }
        "none" => {
            info!("Hot store disabled");
            Ok(Arc::new(NoopHotStore))
        }
        "redis" => open_redis(config).await,
        other => Err(HotStoreError::Unavailable(format!(
            "Unknown hot store backend: {other}"
        ))),
    }
}

#[cfg(feature = "redis")]
async fn open_redis(config: &HotStoreConfig) -> Result<Arc<dyn HotStore>, HotStoreError> {
    match crate::redis_store::RedisHotStore::open(&config.url).await {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) if config.fallback_to_memory => {
            warn!("Redis unavailable, using in-memory hot store: {e}");
            Ok(Arc::new(InMemoryHotStore::new()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(feature = "redis"))]
async fn open_redis(config: &HotStoreConfig) -> Result<Arc<dyn HotStore>, HotStoreError> {
    if config.fallback_to_memory {
        warn!("Built without Redis support, using in-memory hot store");
        Ok(Arc::new(InMemoryHotStore::new()))
    } else {
        Err(HotStoreError::Unavailable(
            "Built without the `redis` feature".into(),
        ))
    }
}

/// Open the configured durable store, running migrations.
pub async fn open_durable_store(
    config: &DurableStoreConfig,
) -> Result<Arc<dyn DurableStore>, DurableError> {
    match config.backend.as_str() {
        "memory" => {
            warn!("Using in-memory durable store; the chat log will not survive a restart");
            Ok(Arc::new(InMemoryDurableStore::new()))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.resolved_url();
            if let Some(parent) = std::path::Path::new(&path).parent() {
                if !parent.as_os_str().is_empty() && !path.contains(":memory:") {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        DurableError::Connection(format!("Cannot create {}: {e}", parent.display()))
                    })?;
                }
            }
            let store =
                crate::sqlite::SqliteDurableStore::open(&path, config.max_connections).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let store =
                crate::postgres::PostgresDurableStore::connect(&config.url, config.max_connections)
                    .await?;
            Ok(Arc::new(store))
        }
        other => Err(DurableError::Connection(format!(
            "Durable backend '{other}' is unknown or not compiled in"
        ))),
    }
}

/// Open both stores and wire them to `summarizer`.
pub async fn open_orchestrator(
    config: &AppConfig,
    summarizer: Arc<dyn Summarizer>,
) -> convmem_core::Result<MemoryOrchestrator> {
    let hot = open_hot_store(&config.hot_store).await?;
    let durable = open_durable_store(&config.durable_store).await?;
    info!(
        hot = hot.name(),
        durable = durable.name(),
        "Memory tiers ready"
    );
    Ok(MemoryOrchestrator::new(
        hot,
        durable,
        summarizer,
        config.memory.clone(),
    ))
}
