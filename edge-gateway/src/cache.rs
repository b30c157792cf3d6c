//! Edge KV response cache, keyed by a hash of method + path + canonical
//! body. Independent of and not coherent with the origin's own TTL cache
//! (see `origin-translator::cache`) -- the two layers are deliberately
//! unaware of each other.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

pub fn cache_key(method: &str, path: &str, canonical_body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\0");
    hasher.update(path.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_body.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
pub trait EdgeCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;
    /// Best-effort entry count for `/admin/cache_stats`; not all backends
    /// can report this cheaply.
    async fn approx_len(&self) -> Option<u64>;
}

// ---------------- Redis implementation ----------------

#[derive(Clone)]
pub struct RedisEdgeCache {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisEdgeCache {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager,
            prefix: "edgecache".to_string(),
        })
    }
}

#[async_trait]
impl EdgeCache for RedisEdgeCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        conn.get(format!("{}:{}", self.prefix, key))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        conn.set_ex(format!("{}:{}", self.prefix, key), value, ttl.as_secs())
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn approx_len(&self) -> Option<u64> {
        None
    }
}

// ---------------- In-memory implementation (tests, dev) ----------------

struct Entry {
    body: Vec<u8>,
    created_at: Instant,
    last_accessed: Instant,
    ttl: Duration,
}

pub struct InMemoryEdgeCache {
    entries: Mutex<HashMap<String, Entry>>,
    max_entries: usize,
    len: AtomicU64,
}

impl InMemoryEdgeCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            len: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl EdgeCache for InMemoryEdgeCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = guard.get_mut(key) {
            if now.duration_since(entry.created_at) < entry.ttl {
                entry.last_accessed = now;
                return Ok(Some(entry.body.clone()));
            }
            guard.remove(key);
            self.len.store(guard.len() as u64, Ordering::Relaxed);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        while guard.len() >= self.max_entries {
            let oldest = guard
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    guard.remove(&k);
                }
                None => break,
            }
        }
        guard.insert(
            key.to_string(),
            Entry {
                body: value,
                created_at: now,
                last_accessed: now,
                ttl,
            },
        );
        self.len.store(guard.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn approx_len(&self) -> Option<u64> {
        Some(self.len.load(Ordering::Relaxed))
    }
}

/// A background task expires entries past `ttl`; kept separate from
/// `get`/`put` so the hot path never pays for a full scan. Exposed for
/// tests that want to assert expiry without waiting on a timer.
impl InMemoryEdgeCache {
    pub fn expire_older_than(&self, ttl: Duration) {
        let now = Instant::now();
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        guard.retain(|_, entry| now.duration_since(entry.created_at) < ttl);
        self.len.store(guard.len() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = InMemoryEdgeCache::new(10);
        let key = cache_key("GET", "/api/translate", "q=ki khobor");
        cache.put(&key, b"cached".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(b"cached".to_vec()));
    }

    #[tokio::test]
    async fn expire_older_than_drops_stale_entries() {
        let cache = InMemoryEdgeCache::new(10);
        let key = cache_key("GET", "/api/translate", "q=ki khobor");
        cache.put(&key, b"cached".to_vec(), Duration::from_secs(60)).await.unwrap();
        std::thread::sleep(Duration::from_millis(20));
        cache.expire_older_than(Duration::from_millis(5));
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[test]
    fn same_inputs_produce_same_key_different_inputs_do_not() {
        let k1 = cache_key("POST", "/translate", "{\"q\":\"hi\"}");
        let k2 = cache_key("POST", "/translate", "{\"q\":\"hi\"}");
        let k3 = cache_key("POST", "/translate/pro", "{\"q\":\"hi\"}");
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
    }
}
