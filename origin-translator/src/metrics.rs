use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct OriginMetrics {
    registry: Registry,
    db_hit_total: IntCounter,
    fallback_ok_total: IntCounter,
    fallback_fail_total: IntCounter,
    request_latency: Histogram,
}

impl OriginMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let db_hit_total = IntCounter::with_opts(Opts::new("db_hit_total", "Total phrase store hits"))?;
        let fallback_ok_total =
            IntCounter::with_opts(Opts::new("fallback_ok_total", "Total successful LM fallback calls"))?;
        let fallback_fail_total =
            IntCounter::with_opts(Opts::new("fallback_fail_total", "Total failed LM fallback calls"))?;
        let request_latency = Histogram::with_opts(HistogramOpts::new(
            "request_latency_seconds",
            "Request handling latency in seconds",
        ))?;

        registry.register(Box::new(db_hit_total.clone()))?;
        registry.register(Box::new(fallback_ok_total.clone()))?;
        registry.register(Box::new(fallback_fail_total.clone()))?;
        registry.register(Box::new(request_latency.clone()))?;

        Ok(Self {
            registry,
            db_hit_total,
            fallback_ok_total,
            fallback_fail_total,
            request_latency,
        })
    }

    pub fn record_db_hit(&self) {
        self.db_hit_total.inc();
    }

    pub fn record_fallback_ok(&self) {
        self.fallback_ok_total.inc();
    }

    pub fn record_fallback_fail(&self) {
        self.fallback_fail_total.inc();
    }

    pub fn observe_latency(&self, secs: f64) {
        self.request_latency.observe(secs);
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"))
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
