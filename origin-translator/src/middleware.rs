use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common_audit::{AuditKind, AuditSeverity};
use common_http_errors::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app_state::AppState;
use crate::cache::TtlCache;
use crate::ip_limit::RateDecision;
use crate::normalize::normalize;
use crate::store::Lang;

const MAX_BODY_BYTES: usize = 1_048_576;
const MAX_PAYLOAD_BYTES: usize = 2048;
const MAX_TEXT_CHARS: usize = 1000;

/// Inputs validated once at the edge of the middleware chain and reused by
/// the cache-read layer and the handler, so neither re-parses the body.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub text: String,
    pub src_lang: Option<Lang>,
    pub tgt_lang: Option<Lang>,
    pub pack: Option<String>,
}

#[derive(Deserialize)]
struct TranslateBody {
    q: Option<String>,
    text: Option<String>,
    src_lang: Option<String>,
    tgt_lang: Option<String>,
    pack: Option<String>,
}

fn client_ip(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
}

/// Times the full request, including every other layer, and feeds the
/// result into the `request_latency_seconds` histogram rendered at `/metrics`.
pub async fn request_latency_mw(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let start = std::time::Instant::now();
    let resp = next.run(req).await;
    state.metrics.observe_latency(start.elapsed().as_secs_f64());
    resp
}

pub async fn shield_check_mw(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !state.config.shield_enforce {
        return next.run(req).await;
    }
    let provided = req
        .headers()
        .get("x-edge-shield")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !common_crypto::constant_time_eq_str(provided, &state.config.shield_token) {
        let ip = client_ip(&req);
        let route = Some(req.uri().path().to_string());
        let _ = state
            .audit
            .append(AuditKind::AuthFail, AuditSeverity::Security, ip, route, json!({"reason": "bad_shield"}));
        return ApiError::Forbidden.into_response();
    }
    next.run(req).await
}

pub async fn size_cap_mw(req: Request<Body>, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return ApiError::PayloadTooLarge.into_response(),
    };
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return ApiError::PayloadTooLarge.into_response();
    }
    let req = Request::from_parts(parts, Body::from(bytes));
    next.run(req).await
}

pub async fn content_type_mw(req: Request<Body>, next: Next) -> Response {
    let ok = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    if !ok {
        return ApiError::UnsupportedMediaType.into_response();
    }
    next.run(req).await
}

fn strip_control_chars(s: &str) -> String {
    s.chars().filter(|c| !c.is_control() || *c == ' ').collect()
}

fn contains_injection_marker(s: &str) -> bool {
    let lower = s.to_lowercase();
    const MARKERS: [&str; 4] = ["<script", "</script", "drop table", "union select"];
    MARKERS.iter().any(|m| lower.contains(m))
}

pub async fn schema_validate_mw(req: Request<Body>, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return ApiError::InvalidJson.into_response(),
    };

    let parsed: TranslateBody = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(_) => return ApiError::InvalidJson.into_response(),
    };

    // The source material alternates between `q` and `text`; accept both,
    // preferring the more explicit `text` field when a caller sends both.
    let raw_text = parsed.text.or(parsed.q).unwrap_or_default();
    let stripped = strip_control_chars(&raw_text);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return ApiError::MissingQuery.into_response();
    }
    if trimmed.chars().count() > MAX_TEXT_CHARS {
        return ApiError::BadRequest.into_response();
    }
    if contains_injection_marker(trimmed) {
        return ApiError::BadRequest.into_response();
    }

    let validated = ValidatedRequest {
        text: trimmed.to_string(),
        src_lang: parsed.src_lang.and_then(|s| s.parse::<Lang>().ok()),
        tgt_lang: parsed.tgt_lang.and_then(|s| s.parse::<Lang>().ok()),
        pack: parsed.pack,
    };

    parts.extensions.insert(validated);
    let req = Request::from_parts(parts, Body::from(bytes));
    next.run(req).await
}

pub async fn ip_rate_limit_mw(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !state.config.ip_rate_limit_enabled {
        return next.run(req).await;
    }
    let ip = client_ip(&req).unwrap_or_else(|| "unknown".to_string());
    let route = Some(req.uri().path().to_string());
    match state.ip_limiter.check(&ip) {
        RateDecision::Allowed => next.run(req).await,
        RateDecision::RateLimited => {
            let _ = state
                .audit
                .append(AuditKind::RateLimited, AuditSeverity::Warn, Some(ip), route, json!({}));
            ApiError::RateLimited.into_response()
        }
        RateDecision::Banned => {
            let _ = state
                .audit
                .append(AuditKind::TempBanStart, AuditSeverity::Warn, Some(ip), route, json!({}));
            ApiError::RateLimited.into_response()
        }
    }
}

/// Canonical representation of a translate request used as the cache-key
/// input. Field order is fixed (alphabetical) so the same logical request
/// always hashes identically. Mirrors `edge_gateway::proxy::CanonicalBody`
/// -- the normalized text alone is not enough to key on, since a request
/// for the same source text but a different `tgt_lang` or `pack` is a
/// different answer.
#[derive(Serialize)]
struct CanonicalBody<'a> {
    pack: &'a Option<String>,
    src_lang: Option<&'static str>,
    text: String,
    tgt_lang: Option<&'static str>,
}

fn canonical_body(v: &ValidatedRequest) -> String {
    let canonical = CanonicalBody {
        pack: &v.pack,
        src_lang: v.src_lang.as_ref().map(Lang::as_str),
        text: normalize(&v.text),
        tgt_lang: v.tgt_lang.as_ref().map(Lang::as_str),
    };
    serde_json::to_string(&canonical).unwrap_or_default()
}

/// Reads the origin TTL cache before dispatch and writes it after, so a
/// single middleware layer models both steps of the cache lifecycle around
/// the handler. `cache=no` suppresses both the read and the write.
pub async fn cache_read_mw(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let bypass = req
        .uri()
        .query()
        .map(|q| q.split('&').any(|pair| pair == "cache=no"))
        .unwrap_or(false);

    let cache_key = req
        .extensions()
        .get::<ValidatedRequest>()
        .map(|v| TtlCache::key(&method, &path, &canonical_body(v)));

    if !bypass {
        if let Some(ref key) = cache_key {
            if let Some(body) = state.cache.get(key) {
                return build_cached_response(body);
            }
        }
    }

    let response = next.run(req).await;
    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return Response::from_parts(parts, Body::empty()),
    };

    if !bypass && parts.status.is_success() {
        if let Some(key) = cache_key {
            state.cache.put(key, bytes.to_vec());
        }
    }

    let mut parts = parts;
    parts
        .headers
        .insert("x-backend-cache", HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

fn build_cached_response(body: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .header("x-backend-cache", "HIT")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ascii_control_characters() {
        let input = "hello\u{0007}world";
        assert_eq!(strip_control_chars(input), "helloworld");
    }

    #[test]
    fn flags_script_tags_case_insensitively() {
        assert!(contains_injection_marker("<SCRIPT>alert(1)</script>"));
        assert!(!contains_injection_marker("rickshaw pabo na"));
    }
}
