//! In-process TTL + LRU cache for origin response bodies.
//!
//! Keyed by a SHA-256 hash of method + path + normalized body. The map
//! lives behind a `std::sync::Mutex` that is never held across an
//! `.await`, so a slow eviction scan can't stall concurrent lookups.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    body: Vec<u8>,
    created_at: Instant,
    last_accessed: Instant,
}

pub struct TtlCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    max_entries: usize,
}

impl TtlCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    pub fn key(method: &str, path: &str, normalized_body: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(method.as_bytes());
        hasher.update(b"\0");
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(normalized_body.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = guard.get_mut(key) {
            if now.duration_since(entry.created_at) < self.ttl {
                entry.last_accessed = now;
                return Some(entry.body.clone());
            }
            guard.remove(key);
        }
        None
    }

    pub fn put(&self, key: String, body: Vec<u8>) {
        let now = Instant::now();
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        guard.retain(|_, entry| now.duration_since(entry.created_at) < self.ttl);

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
            key,
            Entry {
                body,
                created_at: now,
                last_accessed: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
