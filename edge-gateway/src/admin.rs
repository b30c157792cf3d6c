use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use common_audit::{AuditKind, AuditSeverity};
use common_http_errors::{ok_json, ApiError};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::app_state::AppState;
use crate::keystore::ApiKeyMeta;

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    key: String,
}

pub async fn admin_health(State(state): State<AppState>) -> Response {
    let origin_health_url = format!("{}/health", state.config.origin_base_url);
    let origin_reachable = tokio::time::timeout(
        Duration::from_secs(2),
        state.origin_client.get(&origin_health_url).send(),
    )
    .await
    .ok()
    .and_then(|r| r.ok())
    .map(|r| r.status().is_success())
    .unwrap_or(false);

    ok_json(json!({
        "edge": "ok",
        "origin_reachable": origin_reachable,
    }))
    .into_response()
}

pub async fn admin_cache_stats(State(state): State<AppState>) -> Response {
    let entries = state.cache.approx_len().await;
    ok_json(json!({
        "hits": state.metrics.cache_hits(),
        "misses": state.metrics.cache_misses(),
        "entries": entries,
    }))
    .into_response()
}

pub async fn admin_whoami() -> Response {
    ok_json(json!({
        "service": "edge-gateway",
        "env": if cfg!(debug_assertions) { "development" } else { "production" },
    }))
    .into_response()
}

pub async fn admin_keys_add(State(state): State<AppState>, Query(params): Query<KeyQuery>) -> Response {
    if let Err(err) = state
        .keys
        .set_key(
            &params.key,
            ApiKeyMeta {
                plan: "manual".to_string(),
                issued_at: Utc::now(),
                source_event_id: "admin".to_string(),
                email: None,
            },
        )
        .await
    {
        tracing::warn!(error = %err, "admin key add failed");
        return ApiError::StoreUnavailable.into_response();
    }
    let _ = state.audit.append(
        AuditKind::AdminAction,
        AuditSeverity::Info,
        None,
        Some("/admin/keys/add".to_string()),
        json!({"action": "add"}),
    );
    ok_json(json!({"enabled": true})).into_response()
}

pub async fn admin_keys_check(State(state): State<AppState>, Query(params): Query<KeyQuery>) -> Response {
    match state.keys.key_enabled(&params.key).await {
        Ok(enabled) => ok_json(json!({"enabled": enabled})).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "admin key check failed");
            ApiError::StoreUnavailable.into_response()
        }
    }
}

pub async fn admin_keys_del(State(state): State<AppState>, Query(params): Query<KeyQuery>) -> Response {
    if let Err(err) = state.keys.revoke_key(&params.key).await {
        tracing::warn!(error = %err, "admin key revoke failed");
        return ApiError::StoreUnavailable.into_response();
    }
    let _ = state.audit.append(
        AuditKind::KeyRevoked,
        AuditSeverity::Info,
        None,
        Some("/admin/keys/del".to_string()),
        json!({}),
    );
    let _ = state.audit.append(
        AuditKind::AdminAction,
        AuditSeverity::Info,
        None,
        Some("/admin/keys/del".to_string()),
        json!({"action": "del"}),
    );
    ok_json(json!({"enabled": false})).into_response()
}

pub async fn admin_keys_list(State(state): State<AppState>) -> Response {
    match state.keys.count_keys().await {
        Ok(count) => ok_json(json!({"enabled_key_count": count})).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "admin key count failed");
            ApiError::StoreUnavailable.into_response()
        }
    }
}
