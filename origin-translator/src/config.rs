use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct OriginConfig {
    pub bind_addr: String,
    pub db_path: String,
    pub shield_token: String,
    pub shield_enforce: bool,
    pub backend_cache_ttl_secs: u64,
    pub backend_cache_max_entries: usize,
    pub ip_rate_limit_enabled: bool,
    pub ip_rate_limit_per_min: u32,
    pub audit_dir: String,
    pub audit_hmac_secret: String,
    pub audit_max_segment_bytes: u64,
    pub enable_fallback: bool,
    pub fallback_model: String,
    pub fallback_max_tokens: u32,
    pub fallback_timeout_ms: u64,
    pub fallback_safety_level: i32,
    pub llm_base_url: String,
    pub llm_api_key: String,
}

impl OriginConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("ORIGIN_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".to_string());
        let db_path = env::var("PHRASE_DB_PATH").unwrap_or_else(|_| "phrases.db".to_string());
        let shield_token = env::var("EDGE_SHIELD_TOKEN").context("EDGE_SHIELD_TOKEN must be set")?;
        let shield_enforce = env::var("EDGE_SHIELD_ENFORCE")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);
        let backend_cache_ttl_secs = env::var("BACKEND_CACHE_TTL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(180);
        let backend_cache_max_entries = env::var("BACKEND_CACHE_MAX_ENTRIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(10_000);
        let ip_rate_limit_enabled = env::var("ORIGIN_IP_RATE_LIMIT_ENABLED")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);
        let ip_rate_limit_per_min = env::var("IP_RATE_LIMIT_PER_MIN")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(60);
        let audit_dir = env::var("AUDIT_DIR").unwrap_or_else(|_| "./audit".to_string());
        let audit_hmac_secret = env::var("AUDIT_HMAC_SECRET").context("AUDIT_HMAC_SECRET must be set")?;
        let audit_max_segment_bytes = env::var("AUDIT_MAX_SEGMENT_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(64 * 1024 * 1024);
        let enable_fallback = env::var("ENABLE_GPT_FALLBACK")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);
        let fallback_model = env::var("GPT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let fallback_max_tokens = env::var("GPT_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(128);
        let fallback_timeout_ms = env::var("GPT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(2000);
        let fallback_safety_level = env::var("GPT_FALLBACK_SAFETY_LEVEL")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(2);
        let llm_base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com".to_string());
        let llm_api_key = env::var("OPENAI_API_KEY").unwrap_or_default();

        Ok(Self {
            bind_addr,
            db_path,
            shield_token,
            shield_enforce,
            backend_cache_ttl_secs: backend_cache_ttl_secs.max(1),
            backend_cache_max_entries: backend_cache_max_entries.max(1),
            ip_rate_limit_enabled,
            ip_rate_limit_per_min: ip_rate_limit_per_min.max(1),
            audit_dir,
            audit_hmac_secret,
            audit_max_segment_bytes,
            enable_fallback,
            fallback_model,
            fallback_max_tokens,
            fallback_timeout_ms,
            fallback_safety_level,
            llm_base_url,
            llm_api_key,
        })
    }
}
