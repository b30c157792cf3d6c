//! One-time session→key handoff: atomic read-and-delete, origin-allowlisted.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use common_http_errors::{ok_json, ApiError};
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct BillingQuery {
    session_id: String,
}

pub async fn billing_key_handoff(
    State(state): State<AppState>,
    Query(params): Query<BillingQuery>,
) -> Response {
    match state.keys.take_session(&params.session_id).await {
        Ok(Some(api_key)) => ok_json(json!({"api_key": api_key})).into_response(),
        Ok(None) => ApiError::NotFound.into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "key store unreachable during billing handoff");
            ApiError::StoreUnavailable.into_response()
        }
    }
}
