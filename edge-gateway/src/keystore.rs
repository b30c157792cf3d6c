//! Key/Quota store: API key enabled-flags, per-key/day usage counters,
//! session-to-key handoffs and webhook replay locks.
//!
//! Backed by Redis in production (`INCR`/`EXPIRE` for usage counters,
//! `GETDEL` for the one-time session handoff, `SET NX EX` for webhook
//! replay marks) with an in-memory implementation for tests and local
//! development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("key store backend error: {0}")]
    Backend(String),
}

pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyMeta {
    pub plan: String,
    pub issued_at: DateTime<Utc>,
    pub source_event_id: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn key_enabled(&self, key: &str) -> KeyStoreResult<bool>;
    /// Atomically increments `usage:<key>:<date>` and reports whether the
    /// caller is still within `limit` after the increment. `ttl` is applied
    /// only on the increment that creates the counter.
    async fn inc_and_check(&self, key: &str, date: &str, limit: u32, ttl: Duration) -> KeyStoreResult<(i64, bool)>;
    async fn set_key(&self, key: &str, meta: ApiKeyMeta) -> KeyStoreResult<()>;
    async fn revoke_key(&self, key: &str) -> KeyStoreResult<()>;
    async fn put_session(&self, session_id: &str, key: &str, ttl: Duration) -> KeyStoreResult<()>;
    /// Atomic read-and-delete; at most one caller ever observes `Some`.
    async fn take_session(&self, session_id: &str) -> KeyStoreResult<Option<String>>;
    /// Write-if-absent; returns `true` if this call inserted the marker
    /// (first delivery), `false` if it already existed (replay).
    async fn mark_event(&self, event_id: &str, ttl: Duration) -> KeyStoreResult<bool>;
    async fn count_keys(&self) -> KeyStoreResult<u64>;
}

// ---------------- Redis implementation ----------------

#[derive(Clone)]
pub struct RedisKeyStore {
    manager: ConnectionManager,
}

impl RedisKeyStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    fn err(e: impl std::fmt::Display) -> KeyStoreError {
        KeyStoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl KeyStore for RedisKeyStore {
    async fn key_enabled(&self, key: &str) -> KeyStoreResult<bool> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn
            .get(format!("apikey:{key}"))
            .await
            .map_err(Self::err)?;
        Ok(value.as_deref() == Some("enabled"))
    }

    async fn inc_and_check(&self, key: &str, date: &str, limit: u32, ttl: Duration) -> KeyStoreResult<(i64, bool)> {
        let mut conn = self.manager.clone();
        let redis_key = format!("usage:{key}:{date}");
        let current: i64 = conn.incr(&redis_key, 1).await.map_err(Self::err)?;
        if current == 1 {
            let _: () = conn
                .expire(&redis_key, ttl.as_secs() as i64)
                .await
                .map_err(Self::err)?;
        }
        Ok((current, current <= limit as i64))
    }

    async fn set_key(&self, key: &str, meta: ApiKeyMeta) -> KeyStoreResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set(format!("apikey:{key}"), "enabled")
            .await
            .map_err(Self::err)?;
        let payload = serde_json::to_string(&meta).map_err(|e| KeyStoreError::Backend(e.to_string()))?;
        let _: () = conn
            .set(format!("apikey.meta:{key}"), payload)
            .await
            .map_err(Self::err)?;
        Ok(())
    }

    async fn revoke_key(&self, key: &str) -> KeyStoreResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set(format!("apikey:{key}"), "disabled")
            .await
            .map_err(Self::err)?;
        Ok(())
    }

    async fn put_session(&self, session_id: &str, key: &str, ttl: Duration) -> KeyStoreResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(format!("session_to_key:{session_id}"), key, ttl.as_secs())
            .await
            .map_err(Self::err)?;
        Ok(())
    }

    async fn take_session(&self, session_id: &str) -> KeyStoreResult<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(format!("session_to_key:{session_id}"))
            .query_async(&mut conn)
            .await
            .map_err(Self::err)?;
        Ok(value)
    }

    async fn mark_event(&self, event_id: &str, ttl: Duration) -> KeyStoreResult<bool> {
        let mut conn = self.manager.clone();
        let inserted: Option<String> = redis::cmd("SET")
            .arg(format!("stripe_evt:{event_id}"))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(Self::err)?;
        Ok(inserted.is_some())
    }

    async fn count_keys(&self) -> KeyStoreResult<u64> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn.keys("apikey:*").await.map_err(Self::err)?;
        if keys.is_empty() {
            return Ok(0);
        }
        // `revoke_key` leaves the key in place with value "disabled" rather
        // than deleting it, so a plain key count would include revoked
        // keys; filter to the ones still enabled to match `InMemoryKeyStore`
        // and the `enabled_key_count` label this feeds in `/admin/keys/list`.
        let values: Vec<Option<String>> = conn.mget(&keys).await.map_err(Self::err)?;
        Ok(values.iter().filter(|v| v.as_deref() == Some("enabled")).count() as u64)
    }
}

// ---------------- In-memory implementation (tests, dev) ----------------

#[derive(Default)]
struct MemoryState {
    keys: HashMap<String, bool>,
    meta: HashMap<String, ApiKeyMeta>,
    usage: HashMap<(String, String), i64>,
    sessions: HashMap<String, (String, Instant, Duration)>,
    events: HashMap<String, (Instant, Duration)>,
}

#[derive(Default)]
pub struct InMemoryKeyStore {
    inner: Mutex<MemoryState>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn key_enabled(&self, key: &str) -> KeyStoreResult<bool> {
        let guard = self.inner.lock().await;
        Ok(guard.keys.get(key).copied().unwrap_or(false))
    }

    async fn inc_and_check(&self, key: &str, date: &str, limit: u32, _ttl: Duration) -> KeyStoreResult<(i64, bool)> {
        let mut guard = self.inner.lock().await;
        let counter = guard
            .usage
            .entry((key.to_string(), date.to_string()))
            .or_insert(0);
        *counter += 1;
        let current = *counter;
        Ok((current, current <= limit as i64))
    }

    async fn set_key(&self, key: &str, meta: ApiKeyMeta) -> KeyStoreResult<()> {
        let mut guard = self.inner.lock().await;
        guard.keys.insert(key.to_string(), true);
        guard.meta.insert(key.to_string(), meta);
        Ok(())
    }

    async fn revoke_key(&self, key: &str) -> KeyStoreResult<()> {
        let mut guard = self.inner.lock().await;
        guard.keys.insert(key.to_string(), false);
        Ok(())
    }

    async fn put_session(&self, session_id: &str, key: &str, ttl: Duration) -> KeyStoreResult<()> {
        let mut guard = self.inner.lock().await;
        guard
            .sessions
            .insert(session_id.to_string(), (key.to_string(), Instant::now(), ttl));
        Ok(())
    }

    async fn take_session(&self, session_id: &str) -> KeyStoreResult<Option<String>> {
        let mut guard = self.inner.lock().await;
        match guard.sessions.remove(session_id) {
            Some((key, created, ttl)) if created.elapsed() < ttl => Ok(Some(key)),
            _ => Ok(None),
        }
    }

    async fn mark_event(&self, event_id: &str, ttl: Duration) -> KeyStoreResult<bool> {
        let mut guard = self.inner.lock().await;
        if let Some((created, entry_ttl)) = guard.events.get(event_id) {
            if created.elapsed() < *entry_ttl {
                return Ok(false);
            }
        }
        guard
            .events
            .insert(event_id.to_string(), (Instant::now(), ttl));
        Ok(true)
    }

    async fn count_keys(&self) -> KeyStoreResult<u64> {
        let guard = self.inner.lock().await;
        Ok(guard.keys.values().filter(|enabled| **enabled).count() as u64)
    }
}
