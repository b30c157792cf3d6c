pub mod app_state;
pub mod cache;
pub mod config;
pub mod handlers;
pub mod ip_limit;
pub mod llm;
pub mod middleware;
pub mod normalize;
pub mod store;

use axum::middleware::from_fn;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

use app_state::AppState;

/// Builds the route table once; both `main.rs` and the integration tests
/// construct the app this way so tests exercise the exact middleware chain
/// production traffic sees.
pub fn build_router(state: AppState) -> Router {
    let translate_routes = Router::new()
        .route("/translate", post(handlers::translate_free))
        .route("/translate/pro", post(handlers::translate_pro))
        .layer(from_fn_with_state(state.clone(), middleware::cache_read_mw))
        .layer(from_fn_with_state(state.clone(), middleware::ip_rate_limit_mw))
        .layer(from_fn(middleware::schema_validate_mw))
        .layer(from_fn(middleware::content_type_mw))
        .layer(from_fn(middleware::size_cap_mw))
        .layer(from_fn_with_state(state.clone(), middleware::shield_check_mw));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .merge(translate_routes)
        .layer(from_fn(common_http_errors::default_error_envelope_layer))
        .layer(from_fn(move |req, next| {
            common_http_errors::http_error_metrics_layer("origin-translator", req, next)
        }))
        .layer(from_fn_with_state(state.clone(), middleware::request_latency_mw))
        .with_state(state)
}
