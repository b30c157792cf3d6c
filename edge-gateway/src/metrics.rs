use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone)]
pub struct EdgeMetrics {
    registry: Registry,
    cache_hit_total: IntCounter,
    cache_miss_total: IntCounter,
    cache_degraded_total: IntCounter,
    proxy_requests_total: IntCounter,
    hits: std::sync::Arc<AtomicU64>,
    misses: std::sync::Arc<AtomicU64>,
}

impl EdgeMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let cache_hit_total =
            IntCounter::with_opts(Opts::new("edge_cache_hit_total", "Edge cache hits"))?;
        let cache_miss_total =
            IntCounter::with_opts(Opts::new("edge_cache_miss_total", "Edge cache misses"))?;
        let cache_degraded_total = IntCounter::with_opts(Opts::new(
            "edge_cache_degraded_total",
            "Requests served without edge cache due to backend unavailability",
        ))?;
        let proxy_requests_total = IntCounter::with_opts(Opts::new(
            "edge_proxy_requests_total",
            "Total requests forwarded to the origin translator",
        ))?;

        registry.register(Box::new(cache_hit_total.clone()))?;
        registry.register(Box::new(cache_miss_total.clone()))?;
        registry.register(Box::new(cache_degraded_total.clone()))?;
        registry.register(Box::new(proxy_requests_total.clone()))?;

        Ok(Self {
            registry,
            cache_hit_total,
            cache_miss_total,
            cache_degraded_total,
            proxy_requests_total,
            hits: std::sync::Arc::new(AtomicU64::new(0)),
            misses: std::sync::Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn record_cache_hit(&self) {
        self.cache_hit_total.inc();
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_miss_total.inc();
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_degraded(&self) {
        self.cache_degraded_total.inc();
    }

    pub fn record_proxy_request(&self) {
        self.proxy_requests_total.inc();
    }

    pub fn cache_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
