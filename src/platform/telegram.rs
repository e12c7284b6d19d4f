use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;
use crate::platform::{Messenger, OutgoingMessage, SendOutcome, WebhookOutcome};

/// Telegram Bot API client for `sendMessage` and `setWebhook`.
pub struct TelegramClient {
    client: reqwest::Client,
    api_url: String,
    parse_mode: String,
    timeout: Duration,
    /// Confirmation returned after a successful `setWebhook`
    registered_text: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig, registered_text: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            parse_mode: config.parse_mode.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            registered_text: registered_text.into(),
        }
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, token, method)
    }

    /// POST a JSON body to a Bot API method and return the JSON reply,
    /// whatever the HTTP status.
    async fn call(&self, token: &str, method: &str, body: &impl serde::Serialize) -> Result<Value> {
        debug!("Calling Telegram method {}", method);

        let response = self
            .client
            .post(self.method_url(token, method))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            // the URL carries the bot token
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Failed to send {} request to Telegram", method))?;

        let status = response.status();
        let reply: Value = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Failed to parse Telegram {} response ({})", method, status))?;

        if !status.is_success() {
            warn!("Telegram {} returned {}: {}", method, status, reply);
        }

        Ok(reply)
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(&self, token: &str, chat_id: i64, text: &str) -> SendOutcome {
        let message = OutgoingMessage {
            chat_id,
            text,
            parse_mode: &self.parse_mode,
        };

        match self.call(token, "sendMessage", &message).await {
            Ok(reply) => SendOutcome::Delivered(reply),
            Err(e) => {
                warn!("sendMessage to chat {} failed: {:#}", chat_id, e);
                SendOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    async fn set_webhook(&self, token: &str, url: &str) -> WebhookOutcome {
        let reply = match self.call(token, "setWebhook", &json!({ "url": url })).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("setWebhook failed: {:#}", e);
                return WebhookOutcome::failed(format!("{:#}", e));
            }
        };

        if reply.get("ok").and_then(Value::as_bool) == Some(true) {
            info!("Webhook registered: {}", url);
            WebhookOutcome::registered(self.registered_text.clone())
        } else {
            let description = reply
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            warn!("Telegram rejected webhook {}: {}", url, description);
            WebhookOutcome::failed(description)
        }
    }
}
