use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub bind_addr: String,
    pub origin_base_url: String,
    pub shield_token: String,
    pub admin_key: String,
    pub cors_origins: Vec<String>,
    pub edge_cache_ttl_secs: u64,
    pub edge_cache_max_entries: usize,
    pub daily_quota_per_key: u32,
    pub redis_url: Option<String>,
    pub audit_dir: String,
    pub audit_hmac_secret: String,
    pub audit_max_segment_bytes: u64,
    pub stripe_webhook_secret: String,
    pub stripe_timestamp_tolerance_secs: i64,
    pub key_prefix: String,
    pub session_handoff_ttl_secs: u64,
    pub webhook_replay_ttl_secs: u64,
    pub usage_counter_ttl_secs: u64,
    pub edge_to_origin_timeout_ms: u64,
}

impl EdgeConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("EDGE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let origin_base_url =
            env::var("ORIGIN_BASE_URL").context("ORIGIN_BASE_URL must be set")?;
        let shield_token = env::var("EDGE_SHIELD_TOKEN").context("EDGE_SHIELD_TOKEN must be set")?;
        let admin_key = env::var("ADMIN_KEY").context("ADMIN_KEY must be set")?;
        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let edge_cache_ttl_secs = env::var("EDGE_CACHE_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(300);
        let edge_cache_max_entries = env::var("EDGE_CACHE_MAX_ENTRIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(10_000);
        let daily_quota_per_key = env::var("DAILY_QUOTA_PER_KEY")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1000);
        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.is_empty());
        let audit_dir = env::var("AUDIT_DIR").unwrap_or_else(|_| "./audit".to_string());
        let audit_hmac_secret =
            env::var("AUDIT_HMAC_SECRET").context("AUDIT_HMAC_SECRET must be set")?;
        let audit_max_segment_bytes = env::var("AUDIT_MAX_SEGMENT_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(64 * 1024 * 1024);
        let stripe_webhook_secret =
            env::var("STRIPE_WEBHOOK_SECRET").context("STRIPE_WEBHOOK_SECRET must be set")?;
        let key_prefix = env::var("EDGE_KEY_PREFIX").unwrap_or_else(|_| "dhk_live".to_string());

        Ok(Self {
            bind_addr,
            origin_base_url,
            shield_token,
            admin_key,
            cors_origins,
            edge_cache_ttl_secs: edge_cache_ttl_secs.max(1),
            edge_cache_max_entries: edge_cache_max_entries.max(1),
            daily_quota_per_key,
            redis_url,
            audit_dir,
            audit_hmac_secret,
            audit_max_segment_bytes,
            stripe_webhook_secret,
            // Fixed per the provider's scheme, not configurable.
            stripe_timestamp_tolerance_secs: 300,
            key_prefix,
            session_handoff_ttl_secs: 7 * 24 * 3600,
            webhook_replay_ttl_secs: 90 * 24 * 3600,
            usage_counter_ttl_secs: 35 * 24 * 3600,
            edge_to_origin_timeout_ms: 5000,
        })
    }
}
