use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::{BotToken, MessagesConfig};
use crate::llm::Inference;
use crate::platform::{Messenger, SendOutcome, Update};

const BANNER_STATUS: &str = "Telegram bot webhook is running";
const BANNER_SETUP: &str = "Add ?action=setup&webhook_url=YOUR_URL to configure";

/// Transport-neutral view of an inbound HTTP request
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub method: Method,
    pub query: HashMap<String, String>,
    /// Raw body; not assumed to be UTF-8.
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: String,
}

impl HandlerResponse {
    fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", "application/json")],
            body: body.to_string(),
        }
    }

    fn error(status: StatusCode, message: impl AsRef<str>) -> Self {
        Self::json(status, json!({ "error": message.as_ref() }))
    }

    fn ack() -> Self {
        Self::json(StatusCode::OK, json!({ "ok": true }))
    }

    fn preflight() -> Self {
        Self {
            status: StatusCode::OK,
            headers: vec![
                ("Access-Control-Allow-Origin", "*"),
                ("Access-Control-Allow-Methods", "POST, GET, OPTIONS"),
                ("Access-Control-Allow-Headers", "Content-Type"),
            ],
            body: String::new(),
        }
    }

    #[cfg(test)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

/// Webhook entry point: dispatches each request and relays chat messages
/// between Telegram and the inference backend. Holds no per-request state.
pub struct RelayHandler {
    token: BotToken,
    messenger: Arc<dyn Messenger>,
    inference: Arc<dyn Inference>,
    messages: MessagesConfig,
}

impl RelayHandler {
    pub fn new(
        token: BotToken,
        messenger: Arc<dyn Messenger>,
        inference: Arc<dyn Inference>,
        messages: MessagesConfig,
    ) -> Self {
        Self {
            token,
            messenger,
            inference,
            messages,
        }
    }

    pub async fn handle(&self, request: HandlerRequest) -> HandlerResponse {
        debug!("{} request", request.method);

        match request.method {
            Method::OPTIONS => HandlerResponse::preflight(),
            Method::GET => self.handle_get(&request.query).await,
            Method::POST => {
                match AssertUnwindSafe(self.handle_post(&request.body))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(response)) => response,
                    Ok(Err(e)) => {
                        error!("Error processing update: {:#}", e);
                        HandlerResponse::error(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            format!("{:#}", e),
                        )
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!("Panic while processing update: {}", message);
                        HandlerResponse::error(StatusCode::INTERNAL_SERVER_ERROR, message)
                    }
                }
            }
            _ => HandlerResponse::error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
        }
    }

    fn not_configured(&self) -> HandlerResponse {
        warn!("{} is not configured", self.token.name());
        HandlerResponse::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{} not configured", self.token.name()),
        )
    }

    async fn handle_get(&self, query: &HashMap<String, String>) -> HandlerResponse {
        if query.get("action").map(String::as_str) != Some("setup") {
            return HandlerResponse::json(
                StatusCode::OK,
                json!({ "status": BANNER_STATUS, "setup": BANNER_SETUP }),
            );
        }

        let webhook_url = match query.get("webhook_url").filter(|url| !url.is_empty()) {
            Some(url) => url,
            None => {
                return HandlerResponse::error(
                    StatusCode::BAD_REQUEST,
                    "webhook_url parameter required",
                )
            }
        };

        let token = match self.token.resolve() {
            Some(token) => token,
            None => return self.not_configured(),
        };

        info!("Registering webhook: {}", webhook_url);
        let outcome = self.messenger.set_webhook(&token, webhook_url).await;
        match serde_json::to_value(&outcome) {
            Ok(body) => HandlerResponse::json(StatusCode::OK, body),
            Err(e) => HandlerResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    async fn handle_post(&self, body: &[u8]) -> Result<HandlerResponse> {
        let token = match self.token.resolve() {
            Some(token) => token,
            None => return Ok(self.not_configured()),
        };

        let raw: Value = match serde_json::from_slice(body) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Rejecting update body: {}", e);
                return Ok(HandlerResponse::error(StatusCode::BAD_REQUEST, "Invalid JSON"));
            }
        };

        // Updates without a message (edits, callbacks, ...) still need a 2xx.
        if raw.get("message").is_none() {
            return Ok(HandlerResponse::ack());
        }

        let update: Update = serde_json::from_value(raw).context("Malformed message in update")?;
        let message = update.message.context("Update message is null")?;
        let chat_id = message.chat.id;

        let text = message.trimmed_text();
        if text.is_empty() {
            return Ok(HandlerResponse::ack());
        }

        info!("Message from chat {} ({} chars)", chat_id, text.chars().count());

        if text.starts_with("/start") {
            self.send(&token, chat_id, &self.messages.welcome).await;
            return Ok(HandlerResponse::ack());
        }

        self.send(&token, chat_id, &self.messages.thinking).await;
        let reply = self.inference.complete(text).await;
        self.send(&token, chat_id, &reply).await;

        Ok(HandlerResponse::ack())
    }

    /// Fire-and-forget send; the outcome is only logged.
    async fn send(&self, token: &str, chat_id: i64, text: &str) {
        let outcome = self.messenger.send_message(token, chat_id, text).await;
        if let SendOutcome::Failed(_) = outcome {
            debug!("Send to chat {} not delivered: {}", chat_id, outcome.to_json());
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Internal error".to_string()
    }
}
