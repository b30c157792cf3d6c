use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use edge_gateway::app_state::AppState;
use edge_gateway::cache::{EdgeCache, InMemoryEdgeCache, RedisEdgeCache};
use edge_gateway::config::EdgeConfig;
use edge_gateway::keystore::{InMemoryKeyStore, KeyStore, RedisKeyStore};
use edge_gateway::metrics::EdgeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = Arc::new(EdgeConfig::from_env().context("failed to load edge config")?);

    let keys: Arc<dyn KeyStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisKeyStore::connect(url)
                .await
                .context("failed to connect key store to redis")?,
        ),
        None => {
            tracing::warn!("REDIS_URL not set, falling back to in-process key store (dev only)");
            Arc::new(InMemoryKeyStore::new())
        }
    };

    let cache: Arc<dyn EdgeCache> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisEdgeCache::connect(url)
                .await
                .context("failed to connect edge cache to redis")?,
        ),
        None => Arc::new(InMemoryEdgeCache::new(config.edge_cache_max_entries)),
    };

    std::fs::create_dir_all(&config.audit_dir).context("failed to create audit directory")?;
    let audit_path = std::path::Path::new(&config.audit_dir).join("edge-audit.jsonl");
    let audit = Arc::new(
        common_audit::AuditWriter::open(
            audit_path,
            config.audit_hmac_secret.as_bytes().to_vec(),
            config.audit_max_segment_bytes,
        )
        .context("failed to open audit log")?,
    );

    let metrics = Arc::new(EdgeMetrics::new().context("failed to initialize metrics")?);
    let origin_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.edge_to_origin_timeout_ms))
        .build()
        .context("failed to build origin http client")?;

    let state = AppState {
        config: config.clone(),
        keys,
        cache,
        audit,
        metrics,
        origin_client,
    };

    let app = edge_gateway::build_router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "edge-gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
