use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::RedisConfig;

/// Generic string key/value store with per-key TTL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value`, resetting the key's TTL
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Readiness probe
    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct RedisSessionStore {
    pool: Pool,
}

impl RedisSessionStore {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let mut cfg = Config::from_url(config.url.clone());
        cfg.pool = Some(PoolConfig::new(config.pool_max_size.max(1)));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .context("Failed to create Redis pool")?;

        info!("Redis session store configured (max_size={})", config.pool_max_size);

        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await.context("Redis pool exhausted")?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.pool.get().await.context("Redis pool exhausted")?;
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        debug!("SET {} (ttl={}s)", key, ttl.as_secs());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await.context("Redis pool exhausted")?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.get().await.context("Redis pool exhausted")?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local TTL store. Expired keys are removed on read and by
/// the background sweep started with [`InMemorySessionStore::start_sweeper`].
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    storage: Arc<DashMap<String, Entry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drop every expired key, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.storage.len();
        self.storage.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.storage.len())
    }

    /// Periodically drop expired keys. The task ends once the store is dropped.
    pub fn start_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let storage: Weak<DashMap<String, Entry>> = Arc::downgrade(&self.storage);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            info!("Session sweeper started ({:?} interval)", every);

            loop {
                ticker.tick().await;
                let Some(storage) = storage.upgrade() else {
                    debug!("Session store dropped, sweeper exiting");
                    break;
                };

                let store = InMemorySessionStore { storage };
                let removed = store.cleanup_expired();
                if removed > 0 {
                    debug!("Swept {} expired sessions", removed);
                }
            }
        })
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(entry) = self.storage.get(key) else {
            return Ok(None);
        };

        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.storage.remove(key);
            debug!("Key {} expired, removed", key);
            return Ok(None);
        }

        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.storage.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.storage.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemorySessionStore::new();
        store.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_key_is_absent() {
        let store = InMemorySessionStore::new();
        store.set("k", "v", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_drops_keys_never_read_again() {
        let store = InMemorySessionStore::new();
        store.set("history_context:gone", "v", Duration::from_millis(10)).await.unwrap();
        store.set("history_context:live", "v", Duration::from_secs(60)).await.unwrap();

        let sweeper = store.start_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("history_context:live").await.unwrap().as_deref(),
            Some("v")
        );
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_sweeper_stops_with_store() {
        let store = InMemorySessionStore::new();
        let sweeper = store.start_sweeper(Duration::from_millis(5));
        drop(store);

        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper exits")
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_resets_ttl() {
        let store = InMemorySessionStore::new();
        store.set("k", "v1", Duration::from_millis(20)).await.unwrap();
        store.set("k", "v2", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.cleanup_expired(), 0);
    }
}
