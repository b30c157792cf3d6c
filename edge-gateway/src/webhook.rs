//! Stripe webhook handler: signature verification, replay dedupe, key
//! minting and session handoff on `checkout.session.completed`.
//!
//! Signature verification is HMAC-SHA256 over the raw request body,
//! matching Stripe's `t=<ts>,v1=<sig>` header scheme with a bounded
//! timestamp tolerance.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use common_audit::{AuditKind, AuditSeverity};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::app_state::AppState;
use crate::keystore::ApiKeyMeta;

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeCheckoutSession,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    metadata: Option<StripeMetadata>,
}

#[derive(Debug, Deserialize)]
struct StripeMetadata {
    #[serde(default)]
    plan: Option<String>,
}

struct ParsedSignature {
    timestamp: i64,
    v1: String,
}

fn parse_signature_header(header: &str) -> Option<ParsedSignature> {
    let mut timestamp = None;
    let mut v1 = None;
    for part in header.split(',') {
        let mut kv = part.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(v)) => timestamp = v.parse::<i64>().ok(),
            (Some("v1"), Some(v)) => v1 = Some(v.to_string()),
            _ => {}
        }
    }
    Some(ParsedSignature {
        timestamp: timestamp?,
        v1: v1?,
    })
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    let bad_signature = || {
        (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({"ok": false, "error": "bad_signature"})),
        )
    };

    let Some(sig_header) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return bad_signature();
    };
    let Some(parsed) = parse_signature_header(sig_header) else {
        return bad_signature();
    };

    let now = Utc::now().timestamp();
    if (now - parsed.timestamp).abs() > state.config.stripe_timestamp_tolerance_secs {
        return bad_signature();
    }

    let signed_payload = format!("{}.{}", parsed.timestamp, String::from_utf8_lossy(&body));
    let valid = common_crypto::verify_hmac_sha256_hex(
        state.config.stripe_webhook_secret.as_bytes(),
        signed_payload.as_bytes(),
        &parsed.v1,
    )
    .unwrap_or(false);

    if !valid {
        let _ = state.audit.append(
            AuditKind::WebhookBadSig,
            AuditSeverity::Security,
            None,
            Some("/webhook/stripe".to_string()),
            json!({}),
        );
        return bad_signature();
    }

    let event: StripeEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(_) => return bad_signature(),
    };

    if event.event_type != "checkout.session.completed" {
        return (StatusCode::OK, axum::Json(json!({"ok": true, "data": {"ignored": true}})));
    }

    let ttl_events = Duration::from_secs(state.config.webhook_replay_ttl_secs);
    let inserted = match state.keys.mark_event(&event.id, ttl_events).await {
        Ok(v) => v,
        Err(err) => {
            tracing::error!(error = %err, "key store unreachable during webhook dedupe");
            return (StatusCode::OK, axum::Json(json!({"ok": false, "error": "store_unavailable"})));
        }
    };

    if !inserted {
        let _ = state.audit.append(
            AuditKind::WebhookReplay,
            AuditSeverity::Info,
            None,
            Some("/webhook/stripe".to_string()),
            json!({"event_id": event.id}),
        );
        return (StatusCode::OK, axum::Json(json!({"ok": true, "data": {"replay": true}})));
    }

    let session = event.data.object;
    let plan = session
        .metadata
        .and_then(|m| m.plan)
        .unwrap_or_else(|| "pro".to_string());
    let api_key = common_crypto::generate_api_key(&state.config.key_prefix);

    if let Err(err) = state
        .keys
        .set_key(
            &api_key,
            ApiKeyMeta {
                plan,
                issued_at: now_utc(),
                source_event_id: event.id.clone(),
                email: session.customer_email,
            },
        )
        .await
    {
        tracing::error!(error = %err, "failed to persist minted key");
        return (StatusCode::OK, axum::Json(json!({"ok": false, "error": "store_unavailable"})));
    }

    if let Err(err) = state
        .keys
        .put_session(
            &session.id,
            &api_key,
            Duration::from_secs(state.config.session_handoff_ttl_secs),
        )
        .await
    {
        tracing::error!(error = %err, "failed to persist session handoff");
    }

    let _ = state.audit.append(
        AuditKind::KeyMinted,
        AuditSeverity::Info,
        None,
        Some("/webhook/stripe".to_string()),
        json!({"event_id": event.id}),
    );

    (StatusCode::OK, axum::Json(json!({"ok": true, "data": {"minted": true}})))
}

fn now_utc() -> chrono::DateTime<Utc> {
    Utc::now()
}
