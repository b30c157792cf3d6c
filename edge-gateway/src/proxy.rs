//! Shield injection and forwarding to the origin translator, plus the
//! edge KV cache read/write around that call. One function drives both
//! the free and pro routes; the only difference between them is the
//! origin path and whether an `AuthenticatedKey` gate ran first.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use serde::Serialize;
use std::time::Duration;

use crate::app_state::AppState;
use crate::cache::cache_key;

pub struct ProxyInput {
    pub edge_method: &'static str,
    pub edge_path: &'static str,
    pub origin_path: &'static str,
    pub text: String,
    pub src_lang: Option<String>,
    pub tgt_lang: Option<String>,
    pub pack: Option<String>,
    pub bypass_cache: bool,
}

/// Canonical representation of a translate request used both as the
/// cache-key input and the body forwarded to the origin. Field order is
/// fixed (alphabetical) so the same logical request always serializes
/// identically regardless of how the caller ordered its JSON or query
/// parameters.
#[derive(Serialize)]
struct CanonicalBody {
    pack: Option<String>,
    src_lang: Option<String>,
    text: String,
    tgt_lang: Option<String>,
}

pub async fn proxy_translate(state: &AppState, input: ProxyInput) -> Response {
    let canonical = CanonicalBody {
        pack: input.pack.clone(),
        src_lang: input.src_lang.clone(),
        text: input.text.clone(),
        tgt_lang: input.tgt_lang.clone(),
    };
    let canonical_body = serde_json::to_string(&canonical).unwrap_or_default();
    let key = cache_key(input.edge_method, input.edge_path, &canonical_body);

    if !input.bypass_cache {
        match state.cache.get(&key).await {
            Ok(Some(body)) => {
                state.metrics.record_cache_hit();
                return cached_response(body);
            }
            Ok(None) => state.metrics.record_cache_miss(),
            Err(err) => {
                tracing::warn!(error = %err, "edge cache unreachable, degrading to pass-through");
                state.metrics.record_cache_degraded();
            }
        }
    }

    state.metrics.record_proxy_request();
    let url = format!("{}{}", state.config.origin_base_url, input.origin_path);
    let call = state
        .origin_client
        .post(&url)
        .header("x-edge-shield", state.config.shield_token.as_str())
        .header(header::CONTENT_TYPE, "application/json")
        .json(&canonical);

    let timeout = Duration::from_millis(state.config.edge_to_origin_timeout_ms);
    let outcome = tokio::time::timeout(timeout, call.send()).await;

    let upstream = match outcome {
        Err(_) => return ApiError::UpstreamTimeout.into_response(),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "origin unreachable");
            return ApiError::UpstreamUnavailable.into_response();
        }
        Ok(Ok(resp)) => resp,
    };

    let status = upstream.status();
    let bytes = match upstream.bytes().await {
        Ok(b) => b,
        Err(_) => return ApiError::UpstreamUnavailable.into_response(),
    };

    if status.is_success() && !input.bypass_cache {
        if let Err(err) = state
            .cache
            .put(&key, bytes.to_vec(), Duration::from_secs(state.config.edge_cache_ttl_secs))
            .await
        {
            tracing::warn!(error = %err, "edge cache write failed, continuing without caching");
        }
    }

    let mut builder = Response::builder()
        .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY))
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8");
    if status.is_success() {
        builder = builder.header("cf-cache-edge", "MISS");
    }
    builder
        .body(Body::from(bytes))
        .unwrap_or_else(|_| ApiError::Internal.into_response())
}

fn cached_response(body: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .header("cf-cache-edge", "HIT")
        .body(Body::from(body))
        .unwrap_or_else(|_| ApiError::Internal.into_response())
}
