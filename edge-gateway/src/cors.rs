//! CORS allowlist enforcement.
//!
//! `tower_http::cors::CorsLayer` (wired in `lib.rs`) handles echoing the
//! allowed origin and answering preflight `OPTIONS`. This module adds a
//! stricter behavior on top of that: a request carrying an `Origin`
//! header that is *not* on the allowlist is rejected outright, before any
//! other pipeline stage runs, rather than merely served without CORS
//! headers as a browser would do on its own.

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common_audit::{AuditKind, AuditSeverity};
use common_http_errors::ApiError;
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::app_state::AppState;

pub fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    use axum::http::{header, Method};
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
            header::HeaderName::from_static("x-admin-key"),
            header::HeaderName::from_static("stripe-signature"),
        ])
}

pub async fn cors_guard_mw(
    axum::extract::State(state): axum::extract::State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // Preflight is answered by CorsLayer itself; never block it here.
    if req.method() == axum::http::Method::OPTIONS {
        return next.run(req).await;
    }

    let origin = req
        .headers()
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    if let Some(origin) = origin {
        if !state.config.cors_origins.iter().any(|allowed| allowed == &origin) {
            let route = Some(req.uri().path().to_string());
            let _ = state.audit.append(
                AuditKind::CorsBlock,
                AuditSeverity::Warn,
                None,
                route,
                json!({"origin": origin}),
            );
            return ApiError::Forbidden.into_response();
        }
    }

    next.run(req).await
}
