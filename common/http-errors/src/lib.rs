use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};
use serde::Serialize;

/// Canonical error codes from the interface contract (§6.3). Each variant
/// carries exactly the status code and wire string the contract fixes --
/// callers never choose their own string for an existing case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    MissingQuery,
    InvalidJson,
    BadRequest,
    PayloadTooLarge,
    UnsupportedMediaType,
    InvalidApiKey,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    RateLimited,
    StoreUnavailable,
    QuotaUnavailable,
    UpstreamUnavailable,
    UpstreamTimeout,
    BadSignature,
    Internal,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingQuery => "missing_query",
            ApiError::InvalidJson => "invalid_json",
            ApiError::BadRequest => "bad_request",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::UnsupportedMediaType => "unsupported_media_type",
            ApiError::InvalidApiKey => "invalid_api_key",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound => "not_found",
            ApiError::MethodNotAllowed => "method_not_allowed",
            ApiError::RateLimited => "rate_limited",
            ApiError::StoreUnavailable => "store_unavailable",
            ApiError::QuotaUnavailable => "quota_unavailable",
            ApiError::UpstreamUnavailable => "upstream_unavailable",
            ApiError::UpstreamTimeout => "upstream_timeout",
            ApiError::BadSignature => "bad_signature",
            ApiError::Internal => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingQuery
            | ApiError::InvalidJson
            | ApiError::BadRequest
            | ApiError::BadSignature => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::InvalidApiKey | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::StoreUnavailable | ApiError::QuotaUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    ok: bool,
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let mut resp = (status, Json(ErrorEnvelope { ok: false, error: code })).into_response();
        if let Ok(val) = HeaderValue::from_str(code) {
            resp.headers_mut().insert("x-error-code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Envelope for successful responses, `{ok:true, data: ...}`, matching the
/// single response shape every route in the system uses.
#[derive(Serialize)]
pub struct OkEnvelope<T: Serialize> {
    pub ok: bool,
    pub data: T,
}

pub fn ok_json<T: Serialize>(data: T) -> Json<OkEnvelope<T>> {
    Json(OkEnvelope { ok: true, data })
}

static HTTP_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "http_errors_total",
        "Count of HTTP error responses emitted (status >= 400)",
        &["service", "code", "status"]
    )
    .expect("http_errors_total registration")
});

/// Middleware that counts every >=400 response by service/code/status.
/// Shared by both `edge-gateway` and `origin-translator` so they register
/// under the same metric name instead of each duplicating it.
pub async fn http_error_metrics_layer(service: &'static str, req: Request<Body>, next: Next) -> Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get("x-error-code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        HTTP_ERRORS_TOTAL
            .with_label_values(&[service, &code, status.as_str()])
            .inc();
    }
    resp
}

/// Rewrites axum's own routing responses -- an unmatched path's empty `404`
/// and an unmatched method's empty `405` -- into the canonical
/// `{ok:false,error:<code>}` envelope, so every route in the table answers
/// in the same shape whether a handler or the router itself produced the
/// response. Handler-produced errors already carry `x-error-code` and pass
/// through unchanged.
pub async fn default_error_envelope_layer(req: Request<Body>, next: Next) -> Response {
    let resp = next.run(req).await;
    if resp.headers().get("x-error-code").is_some() {
        return resp;
    }
    match resp.status() {
        StatusCode::NOT_FOUND => ApiError::NotFound.into_response(),
        StatusCode::METHOD_NOT_ALLOWED => ApiError::MethodNotAllowed.into_response(),
        _ => resp,
    }
}
