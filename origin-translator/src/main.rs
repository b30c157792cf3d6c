use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use origin_translator::app_state::AppState;
use origin_translator::cache::TtlCache;
use origin_translator::config::OriginConfig;
use origin_translator::ip_limit::IpRateLimiter;
use origin_translator::llm::{LlmClient, ReqwestLlmClient};
use origin_translator::metrics::OriginMetrics;
use origin_translator::store::PhraseStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = Arc::new(OriginConfig::from_env().context("failed to load origin config")?);

    let store = Arc::new(
        PhraseStore::connect(&config.db_path)
            .await
            .context("failed to connect to the phrase store")?,
    );

    let cache = Arc::new(TtlCache::new(
        Duration::from_secs(config.backend_cache_ttl_secs),
        config.backend_cache_max_entries,
    ));

    let llm: Option<Arc<dyn LlmClient>> = if config.enable_fallback {
        Some(Arc::new(ReqwestLlmClient::new(
            config.llm_base_url.clone(),
            config.llm_api_key.clone(),
            config.fallback_model.clone(),
            config.fallback_max_tokens,
            Duration::from_millis(config.fallback_timeout_ms),
        )))
    } else {
        None
    };

    std::fs::create_dir_all(&config.audit_dir).context("failed to create audit directory")?;
    let audit_path = std::path::Path::new(&config.audit_dir).join("origin-audit.jsonl");
    let audit = Arc::new(
        common_audit::AuditWriter::open(
            audit_path,
            config.audit_hmac_secret.as_bytes().to_vec(),
            config.audit_max_segment_bytes,
        )
        .context("failed to open audit log")?,
    );

    let metrics = Arc::new(OriginMetrics::new().context("failed to initialize metrics")?);
    let ip_limiter = Arc::new(IpRateLimiter::new(config.ip_rate_limit_per_min));

    let state = AppState {
        store,
        cache,
        llm,
        audit,
        metrics,
        config: config.clone(),
        ip_limiter,
    };

    let app = origin_translator::build_router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "origin-translator listening");
    axum::serve(listener, app).await?;
    Ok(())
}
