pub mod admin;
pub mod app_state;
pub mod billing;
pub mod cache;
pub mod config;
pub mod cors;
pub mod handlers;
pub mod keystore;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod webhook;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;

use app_state::AppState;

/// Builds the route table once; both `main.rs` and the integration tests
/// construct the app this way so tests exercise the exact middleware
/// chain production traffic sees.
pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/health", get(admin::admin_health))
        .route("/admin/cache_stats", get(admin::admin_cache_stats))
        .route("/admin/whoami", get(admin::admin_whoami))
        .route("/admin/keys/add", get(admin::admin_keys_add))
        .route("/admin/keys/check", get(admin::admin_keys_check))
        .route("/admin/keys/del", get(admin::admin_keys_del))
        .route("/admin/keys/list", get(admin::admin_keys_list))
        .layer(from_fn_with_state(state.clone(), middleware::admin_gate_mw));

    let pro_routes = Router::new()
        .route("/translate/pro", post(handlers::pro_translate_post))
        .layer(from_fn_with_state(state.clone(), middleware::quota_mw))
        .layer(from_fn_with_state(state.clone(), middleware::pro_auth_mw));

    let free_routes = Router::new()
        .route("/api/translate", get(handlers::free_translate_get))
        .route("/translate", post(handlers::free_translate_post));

    let public_routes = Router::new()
        .route("/edge/health", get(handlers::edge_health))
        .route("/version", get(handlers::version))
        .route("/metrics", get(handlers::metrics))
        .route("/billing/key", get(billing::billing_key_handoff))
        .route("/webhook/stripe", post(webhook::stripe_webhook));

    Router::new()
        .merge(public_routes)
        .merge(free_routes)
        .merge(pro_routes)
        .merge(admin_routes)
        .layer(from_fn(common_http_errors::default_error_envelope_layer))
        .layer(from_fn(move |req, next| {
            common_http_errors::http_error_metrics_layer("edge-gateway", req, next)
        }))
        .layer(from_fn_with_state(state.clone(), cors::cors_guard_mw))
        .layer(cors::build_cors_layer(&state.config.cors_origins))
        .with_state(state)
}
