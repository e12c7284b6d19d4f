pub mod telegram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One webhook callback payload. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl Message {
    /// Message text with surrounding whitespace removed; empty when absent.
    pub fn trimmed_text(&self) -> &str {
        self.text.as_deref().unwrap_or("").trim()
    }
}

/// Body of a `sendMessage` call
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    pub parse_mode: &'a str,
}

/// Result of a message send. Callers are free to ignore it.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The platform answered; holds its JSON reply.
    Delivered(Value),
    Failed(String),
}

impl SendOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            SendOutcome::Delivered(reply) => reply.clone(),
            SendOutcome::Failed(error) => json!({ "ok": false, "error": error }),
        }
    }
}

/// Result of a webhook registration, returned verbatim by the setup endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookOutcome {
    pub fn registered(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Outbound side of the messaging platform.
///
/// Implementations absorb every transport failure into the returned value.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, token: &str, chat_id: i64, text: &str) -> SendOutcome;

    async fn set_webhook(&self, token: &str, url: &str) -> WebhookOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_without_message() {
        let update: Update = serde_json::from_str(r#"{"update_id": 5}"#).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn test_message_text_is_trimmed() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 9,
                "chat": {"id": -100123, "type": "group"},
                "from": {"id": 7, "first_name": "A"},
                "text": "  hello \n"
            }
        }))
        .unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, -100123);
        assert_eq!(message.trimmed_text(), "hello");
    }

    #[test]
    fn test_message_without_text_is_empty() {
        let message: Message = serde_json::from_value(json!({"chat": {"id": 1}})).unwrap();
        assert_eq!(message.trimmed_text(), "");
    }

    #[test]
    fn test_message_without_chat_is_rejected() {
        assert!(serde_json::from_value::<Message>(json!({"text": "hi"})).is_err());
    }

    #[test]
    fn test_failed_send_json() {
        let outcome = SendOutcome::Failed("timed out".to_string());
        assert_eq!(outcome.to_json(), json!({"ok": false, "error": "timed out"}));
    }

    #[test]
    fn test_webhook_outcome_json_shape() {
        let ok = serde_json::to_value(WebhookOutcome::registered("done")).unwrap();
        assert_eq!(ok, json!({"success": true, "message": "done"}));

        let err = serde_json::to_value(WebhookOutcome::failed("Unknown error")).unwrap();
        assert_eq!(err, json!({"success": false, "error": "Unknown error"}));
    }
}
