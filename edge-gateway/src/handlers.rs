use axum::body::Bytes;
use axum::extract::{Extension, Query, State};
use axum::response::{IntoResponse, Response};
use common_http_errors::ok_json;
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::middleware::AuthenticatedKey;
use crate::proxy::{proxy_translate, ProxyInput};

#[derive(Debug, Deserialize)]
pub struct TranslateQuery {
    q: Option<String>,
    text: Option<String>,
    src_lang: Option<String>,
    tgt_lang: Option<String>,
    pack: Option<String>,
    cache: Option<String>,
}

impl TranslateQuery {
    fn text(&self) -> String {
        self.text.clone().or_else(|| self.q.clone()).unwrap_or_default()
    }

    fn bypass_cache(&self) -> bool {
        self.cache.as_deref() == Some("no")
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TranslateBody {
    q: Option<String>,
    text: Option<String>,
    src_lang: Option<String>,
    tgt_lang: Option<String>,
    pack: Option<String>,
}

impl TranslateBody {
    fn text(&self) -> String {
        self.text.clone().or_else(|| self.q.clone()).unwrap_or_default()
    }
}

/// Parsed loosely: edge does not perform schema validation (that is the
/// origin's job per the request pipeline); an unparsable body just
/// forwards as an empty text, which the origin will reject as
/// `missing_query`.
fn parse_body(bytes: &Bytes) -> TranslateBody {
    serde_json::from_slice(bytes).unwrap_or_default()
}

pub async fn free_translate_get(
    State(state): State<AppState>,
    Query(params): Query<TranslateQuery>,
) -> Response {
    let bypass = params.bypass_cache();
    proxy_translate(
        &state,
        ProxyInput {
            edge_method: "GET",
            edge_path: "/api/translate",
            origin_path: "/translate",
            text: params.text(),
            src_lang: params.src_lang.clone(),
            tgt_lang: params.tgt_lang.clone(),
            pack: params.pack.clone(),
            bypass_cache: bypass,
        },
    )
    .await
}

pub async fn free_translate_post(
    State(state): State<AppState>,
    Query(params): Query<TranslateQuery>,
    raw_body: Bytes,
) -> Response {
    let bypass = params.bypass_cache();
    let body = parse_body(&raw_body);
    proxy_translate(
        &state,
        ProxyInput {
            edge_method: "POST",
            edge_path: "/translate",
            origin_path: "/translate",
            text: body.text(),
            src_lang: body.src_lang.clone(),
            tgt_lang: body.tgt_lang.clone(),
            pack: body.pack.clone(),
            bypass_cache: bypass,
        },
    )
    .await
}

pub async fn pro_translate_post(
    State(state): State<AppState>,
    Query(params): Query<TranslateQuery>,
    Extension(_key): Extension<AuthenticatedKey>,
    raw_body: Bytes,
) -> Response {
    let bypass = params.bypass_cache();
    let body = parse_body(&raw_body);
    proxy_translate(
        &state,
        ProxyInput {
            edge_method: "POST",
            edge_path: "/translate/pro",
            origin_path: "/translate/pro",
            text: body.text(),
            src_lang: body.src_lang.clone(),
            tgt_lang: body.tgt_lang.clone(),
            pack: body.pack.clone(),
            bypass_cache: bypass,
        },
    )
    .await
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(resp) => resp,
        Err(_) => common_http_errors::ApiError::Internal.into_response(),
    }
}

pub async fn edge_health() -> Response {
    ok_json(json!({"ts": chrono::Utc::now().to_rfc3339(), "env": edge_env()})).into_response()
}

pub async fn version() -> Response {
    let sha = option_env!("BUILD_SHA").unwrap_or("unknown");
    ok_json(json!({"sha": sha})).into_response()
}

fn edge_env() -> &'static str {
    if cfg!(debug_assertions) {
        "development"
    } else {
        "production"
    }
}
