use axum::extract::{Extension, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use common_audit::{AuditKind, AuditSeverity};
use common_http_errors::{ok_json, ApiError, ApiResult};
use serde_json::json;

use crate::app_state::AppState;
use crate::middleware::ValidatedRequest;
use crate::normalize::normalize;
use crate::store::{Lang, PhraseEntry};

const FREE_SAFETY_MAX: i32 = 1;

pub async fn health(State(state): State<AppState>) -> ApiResult<Response> {
    let (db_path, row_count) = state
        .store
        .health_check()
        .await
        .map_err(|_| ApiError::StoreUnavailable)?;
    Ok(ok_json(json!({"db_path": db_path, "row_count": row_count})).into_response())
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(resp) => resp,
        Err(_) => ApiError::Internal.into_response(),
    }
}

pub async fn translate_free(
    State(state): State<AppState>,
    Extension(validated): Extension<ValidatedRequest>,
) -> ApiResult<Response> {
    let normalized = normalize(&validated.text);
    let src_lang = validated.src_lang.unwrap_or(Lang::BnRom);
    let tgt_lang = validated.tgt_lang.unwrap_or(Lang::En);

    let found = state
        .store
        .lookup(src_lang, &normalized, tgt_lang, Some(FREE_SAFETY_MAX), validated.pack.as_deref())
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "phrase store lookup failed");
            ApiError::StoreUnavailable
        })?;

    match found {
        Some(entry) => {
            state.metrics.record_db_hit();
            Ok(ok_json(free_translate_payload(&entry)).into_response())
        }
        None => Err(ApiError::NotFound),
    }
}

pub async fn translate_pro(
    State(state): State<AppState>,
    Extension(validated): Extension<ValidatedRequest>,
) -> ApiResult<Response> {
    let normalized = normalize(&validated.text);
    let src_lang = validated.src_lang.unwrap_or(Lang::BnRom);
    let tgt_lang = validated.tgt_lang.unwrap_or(Lang::En);

    let found = state
        .store
        .lookup(src_lang, &normalized, tgt_lang, None, validated.pack.as_deref())
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "phrase store lookup failed");
            ApiError::StoreUnavailable
        })?;

    if let Some(entry) = found {
        state.metrics.record_db_hit();
        return Ok(ok_json(pro_translate_payload(&entry, "db")).into_response());
    }

    let Some(llm) = state.llm.clone() else {
        return Err(ApiError::NotFound);
    };

    let _ = state.audit.append(AuditKind::FallbackCall, AuditSeverity::Info, None, Some("/translate/pro".to_string()), json!({}));

    match llm.translate(&validated.text, src_lang, tgt_lang).await {
        Ok(tgt_text) => {
            state.metrics.record_fallback_ok();
            let entry = PhraseEntry {
                src_lang,
                src_text: validated.text.clone(),
                normalized_src: normalized,
                tgt_lang,
                tgt_text,
                pack: "auto".to_string(),
                safety_level: state.config.fallback_safety_level,
                created_at: Utc::now(),
            };
            if let Err(err) = state.store.upsert(&entry).await {
                tracing::warn!(error = %err, "fallback translation persisted only best-effort");
                let _ = state.audit.append(
                    AuditKind::FallbackFail,
                    AuditSeverity::Warn,
                    None,
                    Some("/translate/pro".to_string()),
                    json!({"stage": "insert"}),
                );
            }
            Ok(ok_json(pro_translate_payload(&entry, "gpt")).into_response())
        }
        Err(err) => {
            state.metrics.record_fallback_fail();
            tracing::warn!(error = %err, "llm fallback failed");
            let _ = state.audit.append(
                AuditKind::FallbackFail,
                AuditSeverity::Warn,
                None,
                Some("/translate/pro".to_string()),
                json!({"stage": "call"}),
            );
            Err(ApiError::NotFound)
        }
    }
}

/// Free hit body: exactly `{src, tgt, src_lang, tgt_lang, source:"db"}`,
/// with no `pack` field (that's a pro-only detail, §4.2.3 vs §4.2.4).
fn free_translate_payload(entry: &PhraseEntry) -> serde_json::Value {
    json!({
        "src": entry.src_text,
        "tgt": entry.tgt_text,
        "src_lang": entry.src_lang.as_str(),
        "tgt_lang": entry.tgt_lang.as_str(),
        "source": "db",
    })
}

fn pro_translate_payload(entry: &PhraseEntry, source: &str) -> serde_json::Value {
    json!({
        "src": entry.src_text,
        "tgt": entry.tgt_text,
        "src_lang": entry.src_lang.as_str(),
        "tgt_lang": entry.tgt_lang.as_str(),
        "source": source,
        "pack": entry.pack,
    })
}
