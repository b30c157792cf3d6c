//! Admin / pro / quota gates, composed as `from_fn_with_state` layers in
//! the order fixed by the request pipeline: admin gate on the admin
//! prefix, pro gate then quota on `/translate/pro`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use common_audit::{AuditKind, AuditSeverity};
use common_http_errors::ApiError;
use serde_json::json;
use std::time::Duration;

use crate::app_state::AppState;

pub fn client_ip(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
}

/// Validated pro-tier API key, inserted by [`pro_auth_mw`] for downstream
/// handlers and the quota layer to read without re-parsing headers.
#[derive(Debug, Clone)]
pub struct AuthenticatedKey(pub String);

pub async fn admin_gate_mw(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let provided = req
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !common_crypto::constant_time_eq_str(provided, &state.config.admin_key) {
        let ip = client_ip(&req);
        let route = Some(req.uri().path().to_string());
        let _ = state
            .audit
            .append(AuditKind::AuthFail, AuditSeverity::Security, ip, route, json!({"gate": "admin"}));
        return ApiError::Unauthorized.into_response();
    }
    next.run(req).await
}

pub async fn pro_auth_mw(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let provided = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let Some(key) = provided else {
        let ip = client_ip(&req);
        let _ = state.audit.append(
            AuditKind::AuthFail,
            AuditSeverity::Security,
            ip,
            Some(req.uri().path().to_string()),
            json!({"reason": "missing_api_key"}),
        );
        return ApiError::InvalidApiKey.into_response();
    };

    match state.keys.key_enabled(&key).await {
        Ok(true) => {
            req.extensions_mut().insert(AuthenticatedKey(key));
            next.run(req).await
        }
        Ok(false) => {
            let ip = client_ip(&req);
            let _ = state.audit.append(
                AuditKind::AuthFail,
                AuditSeverity::Security,
                ip,
                Some(req.uri().path().to_string()),
                json!({"reason": "disabled_or_unknown_key"}),
            );
            ApiError::InvalidApiKey.into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err, "key store unreachable during pro auth gate");
            ApiError::QuotaUnavailable.into_response()
        }
    }
}

pub async fn quota_mw(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let Some(AuthenticatedKey(key)) = req.extensions().get::<AuthenticatedKey>().cloned() else {
        // pro_auth_mw must run first; absence means misconfigured router.
        return ApiError::Internal.into_response();
    };

    let date = Utc::now().format("%Y-%m-%d").to_string();
    match state
        .keys
        .inc_and_check(
            &key,
            &date,
            state.config.daily_quota_per_key,
            Duration::from_secs(state.config.usage_counter_ttl_secs),
        )
        .await
    {
        Ok((_, true)) => next.run(req).await,
        Ok((_, false)) => {
            let ip = client_ip(&req);
            let _ = state.audit.append(
                AuditKind::RateLimited,
                AuditSeverity::Warn,
                ip,
                Some(req.uri().path().to_string()),
                json!({"key_hash": key_hash(&key)}),
            );
            let mut resp = ApiError::RateLimited.into_response();
            if let Ok(val) = header::HeaderValue::from_str("86400") {
                resp.headers_mut().insert("retry-after", val);
            }
            resp
        }
        Err(err) => {
            tracing::warn!(error = %err, "quota store unreachable");
            ApiError::QuotaUnavailable.into_response()
        }
    }
}

/// Audit events never carry the raw key; a short hash is enough to
/// correlate repeated violations without storing the secret itself.
fn key_hash(key: &str) -> String {
    common_crypto::hmac_sha256_hex(b"edge-audit-key-hash", key.as_bytes())
        .unwrap_or_default()
        .chars()
        .take(16)
        .collect()
}
