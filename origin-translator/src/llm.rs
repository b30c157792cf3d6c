//! External language-model fallback client.
//!
//! A narrow capability: `translate(text, src, tgt) -> text`. No streaming,
//! no hidden retries beyond the single transport-error retry called out in
//! the pro-translate flow.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::store::Lang;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request timed out")]
    Timeout,
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm returned an error response: {0}")]
    Upstream(String),
    #[error("llm returned empty output")]
    Empty,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn translate(&self, text: &str, src: Lang, tgt: Lang) -> Result<String, LlmError>;
}

pub struct ReqwestLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ReqwestLlmClient {
    pub fn new(base_url: String, api_key: String, model: String, max_tokens: u32, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url,
            api_key,
            model,
            max_tokens,
        }
    }

    async fn send_once(&self, text: &str, src: Lang, tgt: Lang) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let prompt = format!(
            "Translate the following text from {} to {}. Reply with the translation only.\n\n{}",
            src, tgt, text
        );
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(LlmError::Upstream(format!("status {}", status)));
        }

        let parsed: LlmCompletion = resp
            .json()
            .await
            .map_err(|e| LlmError::Upstream(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for ReqwestLlmClient {
    async fn translate(&self, text: &str, src: Lang, tgt: Lang) -> Result<String, LlmError> {
        match self.send_once(text, src, tgt).await {
            Ok(t) => Ok(t),
            // At most one retry, and only on a transport-level failure --
            // never on a well-formed error response or empty result.
            Err(LlmError::Transport(_)) | Err(LlmError::Timeout) => self.send_once(text, src, tgt).await,
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct LlmCompletion {
    choices: Vec<LlmChoice>,
}

#[derive(Debug, serde::Deserialize)]
struct LlmChoice {
    message: LlmMessage,
}

#[derive(Debug, serde::Deserialize)]
struct LlmMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> ReqwestLlmClient {
        ReqwestLlmClient::new(
            server.base_url(),
            "test-key".to_string(),
            "test-model".to_string(),
            128,
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn translates_on_success() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(serde_json::json!({
                "choices": [{"message": {"content": "won't get a rickshaw"}}]
            }));
        });

        let client = client_for(&server);
        let result = client.translate("rickshaw pabo na", Lang::BnRom, Lang::En).await.unwrap();
        assert_eq!(result, "won't get a rickshaw");
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(serde_json::json!({
                "choices": [{"message": {"content": "   "}}]
            }));
        });

        let client = client_for(&server);
        let result = client.translate("x", Lang::BnRom, Lang::En).await;
        assert!(matches!(result, Err(LlmError::Empty)));
    }

    #[tokio::test]
    async fn upstream_error_status_is_not_retried_into_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500);
        });

        let client = client_for(&server);
        let result = client.translate("x", Lang::BnRom, Lang::En).await;
        assert!(matches!(result, Err(LlmError::Upstream(_))));
        mock.assert_hits(1);
    }
}
