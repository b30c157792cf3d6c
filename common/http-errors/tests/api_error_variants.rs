use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common_http_errors::ApiError;

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn invalid_api_key_is_401_with_canonical_code() {
    let resp = ApiError::InvalidApiKey.into_response();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("x-error-code").unwrap(), "invalid_api_key");
    let json = body_json(resp).await;
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"], "invalid_api_key");
}

#[tokio::test]
async fn forbidden_is_403() {
    let resp = ApiError::Forbidden.into_response();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers().get("x-error-code").unwrap(), "forbidden");
}

#[tokio::test]
async fn rate_limited_is_429() {
    let resp = ApiError::RateLimited.into_response();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn bad_signature_is_400() {
    let resp = ApiError::BadSignature.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("x-error-code").unwrap(), "bad_signature");
}

#[tokio::test]
async fn not_found_is_404() {
    let resp = ApiError::NotFound.into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
