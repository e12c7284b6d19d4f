use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{InferenceConfig, MessagesConfig};

/// Text generation backend used for chat replies.
#[async_trait]
pub trait Inference: Send + Sync {
    /// Generate a reply for `prompt`. Failures come back as user-facing text.
    async fn complete(&self, prompt: &str) -> String;
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    message: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct InferenceReply {
    #[serde(default)]
    response: Option<String>,
}

/// Client for the remote inference endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    config: InferenceConfig,
    fallback: String,
    error_prefix: String,
}

impl LlmClient {
    pub fn new(config: InferenceConfig, messages: &MessagesConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            fallback: messages.fallback.clone(),
            error_prefix: messages.error_prefix.clone(),
        }
    }

    /// Returns `None` when the endpoint answered without a `response` field.
    async fn try_complete(&self, prompt: &str) -> Result<Option<String>> {
        let request = InferenceRequest {
            message: prompt,
            model: &self.config.model,
        };

        debug!("Sending request to inference endpoint: {}", self.config.url);

        let response = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&request)
            .send()
            .await
            .context("Failed to send request to inference endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Inference endpoint error ({}): {}", status, error_body);
        }

        let reply: InferenceReply = response
            .json()
            .await
            .context("Failed to parse inference response")?;

        Ok(reply.response)
    }
}

#[async_trait]
impl Inference for LlmClient {
    async fn complete(&self, prompt: &str) -> String {
        match self.try_complete(prompt).await {
            Ok(Some(text)) => text,
            Ok(None) => self.fallback.clone(),
            Err(e) => {
                warn!("Inference call failed: {:#}", e);
                format!("{}{:#}", self.error_prefix, e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(url: String) -> LlmClient {
        let config = InferenceConfig {
            url,
            ..InferenceConfig::default()
        };
        LlmClient::new(config, &MessagesConfig::default())
    }

    #[tokio::test]
    async fn test_complete_returns_response_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ai")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"message": "What is 2+2?", "model": "llama"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response": "4"}"#)
            .create_async()
            .await;

        let reply = client_for(format!("{}/ai", server.url()))
            .complete("What is 2+2?")
            .await;

        mock.assert_async().await;
        assert_eq!(reply, "4");
    }

    #[tokio::test]
    async fn test_missing_response_field_uses_fallback() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/ai")
            .with_status(200)
            .with_body(r#"{"result": "ignored"}"#)
            .create_async()
            .await;

        let reply = client_for(format!("{}/ai", server.url())).complete("hi").await;
        assert_eq!(reply, "Извините, не удалось получить ответ");
    }

    #[tokio::test]
    async fn test_error_status_becomes_error_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/ai")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let reply = client_for(format!("{}/ai", server.url())).complete("hi").await;
        assert!(reply.starts_with("Ошибка при обращении к ИИ: "));
        assert!(reply.contains("500"));
    }

    #[tokio::test]
    async fn test_malformed_json_becomes_error_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/ai")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let reply = client_for(format!("{}/ai", server.url())).complete("hi").await;
        assert!(reply.starts_with("Ошибка при обращении к ИИ: "));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_becomes_error_text() {
        let reply = client_for("http://127.0.0.1:1/ai".to_string())
            .complete("hi")
            .await;
        assert!(reply.starts_with("Ошибка при обращении к ИИ: "));
    }
}
