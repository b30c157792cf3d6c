use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use httpmock::prelude::*;
use serde_json::{json, Value};
use tower::ServiceExt;

use edge_gateway::app_state::AppState;
use edge_gateway::cache::InMemoryEdgeCache;
use edge_gateway::config::EdgeConfig;
use edge_gateway::keystore::{ApiKeyMeta, InMemoryKeyStore, KeyStore};
use edge_gateway::metrics::EdgeMetrics;

const SHIELD_TOKEN: &str = "test-shield-secret";
const ADMIN_KEY: &str = "test-admin-secret";
const STRIPE_SECRET: &str = "whsec_test_secret";

fn test_config(origin_base_url: String, daily_quota: u32, cors_origins: Vec<String>) -> EdgeConfig {
    EdgeConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        origin_base_url,
        shield_token: SHIELD_TOKEN.to_string(),
        admin_key: ADMIN_KEY.to_string(),
        cors_origins,
        edge_cache_ttl_secs: 300,
        edge_cache_max_entries: 1000,
        daily_quota_per_key: daily_quota,
        redis_url: None,
        audit_dir: "unused".to_string(),
        audit_hmac_secret: "secret".to_string(),
        audit_max_segment_bytes: 64 * 1024 * 1024,
        stripe_webhook_secret: STRIPE_SECRET.to_string(),
        stripe_timestamp_tolerance_secs: 300,
        key_prefix: "dhk_test".to_string(),
        session_handoff_ttl_secs: 7 * 24 * 3600,
        webhook_replay_ttl_secs: 90 * 24 * 3600,
        usage_counter_ttl_secs: 35 * 24 * 3600,
        edge_to_origin_timeout_ms: 2000,
    }
}

async fn test_state(config: EdgeConfig) -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let audit = Arc::new(
        common_audit::AuditWriter::open(dir.path().join("audit.jsonl"), b"secret".to_vec(), 64 * 1024 * 1024)
            .unwrap(),
    );
    let state = AppState {
        keys: Arc::new(InMemoryKeyStore::new()),
        cache: Arc::new(InMemoryEdgeCache::new(config.edge_cache_max_entries)),
        audit,
        metrics: Arc::new(EdgeMetrics::new().unwrap()),
        origin_client: reqwest::Client::new(),
        config: Arc::new(config),
    };
    (state, dir)
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn free_translate_forwards_to_origin_and_caches_on_second_call() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/translate");
        then.status(200).json_body(json!({
            "ok": true,
            "data": {"src": "ki khobor", "tgt": "what's up", "src_lang": "bn-rom", "tgt_lang": "en", "source": "db", "pack": "default"}
        }));
    });

    let (state, _dir) = test_state(test_config(server.base_url(), 1000, vec![])).await;
    let app = edge_gateway::build_router(state);

    let first = app
        .clone()
        .oneshot(Request::get("/api/translate?q=ki%20khobor").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers().get("cf-cache-edge").unwrap(), "MISS");

    let second = app
        .oneshot(Request::get("/api/translate?q=ki%20khobor").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(second.headers().get("cf-cache-edge").unwrap(), "HIT");

    mock.assert_hits(1);
}

#[tokio::test]
async fn free_translate_miss_passes_through_origin_404() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/translate");
        then.status(404).json_body(json!({"ok": false, "error": "not_found"}));
    });

    let (state, _dir) = test_state(test_config(server.base_url(), 1000, vec![])).await;
    let app = edge_gateway::build_router(state);

    let resp = app
        .oneshot(
            Request::post("/translate")
                .header("content-type", "application/json")
                .body(Body::from(json!({"q": "zzz no such phrase"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn pro_translate_without_api_key_is_unauthorized() {
    let (state, _dir) = test_state(test_config("http://unused".to_string(), 1000, vec![])).await;
    let app = edge_gateway::build_router(state);

    let resp = app
        .oneshot(
            Request::post("/translate/pro")
                .header("content-type", "application/json")
                .body(Body::from(json!({"q": "hi"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "invalid_api_key");
}

#[tokio::test]
async fn pro_translate_over_daily_quota_is_rate_limited() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/translate/pro");
        then.status(404).json_body(json!({"ok": false, "error": "not_found"}));
    });

    let (state, _dir) = test_state(test_config(server.base_url(), 1, vec![])).await;
    state
        .keys
        .set_key(
            "K1",
            ApiKeyMeta {
                plan: "pro".to_string(),
                issued_at: Utc::now(),
                source_event_id: "evt_1".to_string(),
                email: None,
            },
        )
        .await
        .unwrap();
    let app = edge_gateway::build_router(state);

    let make_req = || {
        Request::post("/translate/pro")
            .header("content-type", "application/json")
            .header("x-api-key", "K1")
            .body(Body::from(json!({"q": "distinct phrase one"}).to_string()))
            .unwrap()
    };

    let first = app.clone().oneshot(make_req()).await.unwrap();
    assert_eq!(first.status(), StatusCode::NOT_FOUND);

    let second = app.oneshot(make_req()).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(second).await;
    assert_eq!(body["error"], "rate_limited");
}

#[tokio::test]
async fn admin_endpoints_require_admin_key() {
    let (state, _dir) = test_state(test_config("http://unused".to_string(), 1000, vec![])).await;
    let app = edge_gateway::build_router(state);

    let unauthorized = app
        .clone()
        .oneshot(Request::get("/admin/cache_stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let authorized = app
        .oneshot(
            Request::get("/admin/cache_stats")
                .header("x-admin-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(authorized.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_keys_add_check_del_round_trip() {
    let (state, _dir) = test_state(test_config("http://unused".to_string(), 1000, vec![])).await;
    let app = edge_gateway::build_router(state);

    let add = app
        .clone()
        .oneshot(
            Request::get("/admin/keys/add?key=K9")
                .header("x-admin-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(add.status(), StatusCode::OK);

    let check = app
        .clone()
        .oneshot(
            Request::get("/admin/keys/check?key=K9")
                .header("x-admin-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let check_body = body_json(check).await;
    assert_eq!(check_body["data"]["enabled"], true);

    let del = app
        .clone()
        .oneshot(
            Request::get("/admin/keys/del?key=K9")
                .header("x-admin-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(del.status(), StatusCode::OK);

    let recheck = app
        .oneshot(
            Request::get("/admin/keys/check?key=K9")
                .header("x-admin-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let recheck_body = body_json(recheck).await;
    assert_eq!(recheck_body["data"]["enabled"], false);
}

#[tokio::test]
async fn billing_handoff_is_single_read() {
    let (state, _dir) = test_state(test_config("http://unused".to_string(), 1000, vec![])).await;
    state
        .keys
        .put_session("sess_abc", "K1", Duration::from_secs(3600))
        .await
        .unwrap();
    let app = edge_gateway::build_router(state);

    let first = app
        .clone()
        .oneshot(Request::get("/billing/key?session_id=sess_abc").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = body_json(first).await;
    assert_eq!(first_body["data"]["api_key"], "K1");

    let second = app
        .oneshot(Request::get("/billing/key?session_id=sess_abc").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disallowed_cors_origin_is_rejected() {
    let (state, _dir) = test_state(test_config(
        "http://unused".to_string(),
        1000,
        vec!["https://allowed.example".to_string()],
    ))
    .await;
    let app = edge_gateway::build_router(state);

    let blocked = app
        .clone()
        .oneshot(
            Request::get("/edge/health")
                .header("origin", "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);

    let allowed = app
        .oneshot(
            Request::get("/edge/health")
                .header("origin", "https://allowed.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

fn stripe_signature(secret: &str, ts: i64, body: &str) -> String {
    let signed_payload = format!("{}.{}", ts, body);
    let sig = common_crypto::hmac_sha256_hex(secret.as_bytes(), signed_payload.as_bytes()).unwrap();
    format!("t={},v1={}", ts, sig)
}

#[tokio::test]
async fn webhook_replay_does_not_mint_a_second_key() {
    let (state, _dir) = test_state(test_config("http://unused".to_string(), 1000, vec![])).await;
    let app = edge_gateway::build_router(state);

    let payload = json!({
        "id": "evt_123",
        "type": "checkout.session.completed",
        "data": {"object": {"id": "sess_xyz", "customer_email": "buyer@example.com"}}
    })
    .to_string();
    let ts = Utc::now().timestamp();
    let sig = stripe_signature(STRIPE_SECRET, ts, &payload);

    let make_req = |body: String, sig: String| {
        Request::post("/webhook/stripe")
            .header("content-type", "application/json")
            .header("stripe-signature", sig)
            .body(Body::from(body))
            .unwrap()
    };

    let first = app
        .clone()
        .oneshot(make_req(payload.clone(), sig.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = body_json(first).await;
    assert_eq!(first_body["data"]["minted"], true);

    let second = app
        .oneshot(make_req(payload, sig))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_body = body_json(second).await;
    assert_eq!(second_body["data"]["replay"], true);
}

#[tokio::test]
async fn webhook_bad_signature_is_rejected() {
    let (state, _dir) = test_state(test_config("http://unused".to_string(), 1000, vec![])).await;
    let app = edge_gateway::build_router(state);

    let payload = json!({
        "id": "evt_bad",
        "type": "checkout.session.completed",
        "data": {"object": {"id": "sess_bad"}}
    })
    .to_string();
    let ts = Utc::now().timestamp();

    let resp = app
        .oneshot(
            Request::post("/webhook/stripe")
                .header("content-type", "application/json")
                .header("stripe-signature", format!("t={},v1=deadbeef", ts))
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "bad_signature");
}

#[tokio::test]
async fn unknown_path_returns_canonical_not_found() {
    let (state, _dir) = test_state(test_config("http://unused".to_string(), 1000, vec![])).await;
    let app = edge_gateway::build_router(state);

    let resp = app
        .oneshot(Request::get("/no/such/route").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn unsupported_method_returns_canonical_method_not_allowed() {
    let (state, _dir) = test_state(test_config("http://unused".to_string(), 1000, vec![])).await;
    let app = edge_gateway::build_router(state);

    let resp = app
        .oneshot(Request::delete("/edge/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "method_not_allowed");
}
