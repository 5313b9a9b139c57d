use crate::capture::{CapturedExchange, ExchangeReady};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serialized map of exchanges, keyed by `<correlation key>@<request time>`.
pub type Snapshot = BTreeMap<String, CapturedExchange>;

/// Persistence for completed exchanges.
///
/// Holds two things: the latest snapshot of completed/synthesized exchanges,
/// rewritten on every such transition, and the list of events whose delivery
/// exhausted its retries.
pub trait ExchangeStore: Send + Sync {
    /// Load the last saved snapshot (empty if none)
    fn load(&self) -> Result<Snapshot>;

    /// Replace the saved snapshot
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Drop the snapshot and the undelivered list
    fn clear(&self) -> Result<()>;

    /// Record an event that could not be delivered
    fn put_undelivered(&self, ready: &ExchangeReady) -> Result<()>;

    /// Drain the undelivered list, oldest first
    fn take_undelivered(&self) -> Result<Vec<ExchangeReady>>;
}

/// Store that persists nothing.
#[derive(Debug)]
pub struct NoOpExchangeStore;

impl ExchangeStore for NoOpExchangeStore {
    fn load(&self) -> Result<Snapshot> {
        Ok(Snapshot::new())
    }

    fn save(&self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn put_undelivered(&self, ready: &ExchangeReady) -> Result<()> {
        tracing::warn!(
            correlation_key = %ready.correlation_key,
            revision = ready.revision,
            "NoOpExchangeStore: dropping undelivered exchange. Configure a store to keep it."
        );
        Ok(())
    }

    fn take_undelivered(&self) -> Result<Vec<ExchangeReady>> {
        Ok(Vec::new())
    }
}

/// Create an ExchangeStore based on configuration
pub fn create_exchange_store(config: &crate::config::StoreConfig) -> Result<Arc<dyn ExchangeStore>> {
    match config.backend.as_str() {
        "inmemory" => {
            use crate::backends::InMemoryExchangeStore;
            tracing::info!("Using InMemory ExchangeStore");
            Ok(Arc::new(InMemoryExchangeStore::new()))
        }
        "file" => {
            use crate::backends::FileExchangeStore;
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| anyhow!("File backend selected but no store.path provided"))?;
            tracing::info!("Using file ExchangeStore (path={})", path.display());
            Ok(Arc::new(FileExchangeStore::new(path.clone())))
        }
        "redis" => {
            let redis_config = config
                .redis
                .as_ref()
                .ok_or_else(|| anyhow!("Redis backend selected but no redis config provided"))?;

            #[cfg(feature = "redis-backend")]
            {
                use crate::backends::RedisExchangeStore;
                use anyhow::Context;

                let store = RedisExchangeStore::new(
                    &redis_config.url,
                    redis_config.pool_size,
                    redis_config.key_prefix.clone(),
                )
                .context("Failed to create Redis backend")?;

                tracing::info!("Using redis ExchangeStore (url={})", redis_config.url);

                Ok(Arc::new(store))
            }

            #[cfg(not(feature = "redis-backend"))]
            {
                let _ = redis_config;
                Err(anyhow!(
                    "Redis backend not available. Compile with --features redis-backend"
                ))
            }
        }
        other => Err(anyhow!("Unknown backend type: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Headers, RequestData};
    use crate::config::StoreConfig;

    fn ready() -> ExchangeReady {
        CapturedExchange::new("k", "s", RequestData::new("u", "GET", Headers::new())).to_ready()
    }

    // ============================================
    // Tests for NoOpExchangeStore
    // ============================================

    #[test]
    fn test_noop_store_load_is_empty() {
        let store = NoOpExchangeStore;
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "k".to_string(),
            CapturedExchange::new("k", "s", RequestData::new("u", "GET", Headers::new())),
        );
        store.save(&snapshot).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_noop_store_drops_undelivered() {
        let store = NoOpExchangeStore;
        store.put_undelivered(&ready()).unwrap();
        assert!(store.take_undelivered().unwrap().is_empty());
        assert!(store.clear().is_ok());
    }

    // ============================================
    // Tests for create_exchange_store factory
    // ============================================

    #[test]
    fn test_create_inmemory_store() {
        let store = create_exchange_store(&StoreConfig::default()).unwrap();
        store.put_undelivered(&ready()).unwrap();
        assert_eq!(store.take_undelivered().unwrap().len(), 1);
    }

    #[test]
    fn test_create_file_store_requires_path() {
        let config = StoreConfig {
            backend: "file".to_string(),
            path: None,
            redis: None,
        };
        assert!(create_exchange_store(&config).is_err());
    }

    #[test]
    fn test_create_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: "file".to_string(),
            path: Some(dir.path().join("captures.json")),
            redis: None,
        };
        let store = create_exchange_store(&config).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_create_redis_store_requires_config() {
        let config = StoreConfig {
            backend: "redis".to_string(),
            path: None,
            redis: None,
        };
        let err = create_exchange_store(&config).err().unwrap();
        assert!(err.to_string().contains("no redis config"));
    }

    #[test]
    fn test_create_unknown_backend() {
        let config = StoreConfig {
            backend: "sqlite".to_string(),
            path: None,
            redis: None,
        };
        let err = create_exchange_store(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown backend type"));
    }
}
