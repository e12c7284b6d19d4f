use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderName, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tracing::info;

use crate::config::Config;
use crate::llm::LlmClient;
use crate::platform::telegram::TelegramClient;
use crate::relay::{HandlerRequest, HandlerResponse, RelayHandler};

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, Body::from(self.body)).into_response();
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
                headers.insert(name, HeaderValue::from_static(value));
            }
        }
        response
    }
}

/// Build the handler with the real Telegram and inference clients
pub fn build_handler(config: &Config) -> RelayHandler {
    let telegram = TelegramClient::new(
        &config.telegram,
        config.messages.webhook_registered.clone(),
    );
    let llm = LlmClient::new(config.inference.clone(), &config.messages);

    RelayHandler::new(
        config.telegram.token_source(),
        Arc::new(telegram),
        Arc::new(llm),
        config.messages.clone(),
    )
}

/// Every path and method goes to the relay handler.
pub fn router(handler: Arc<RelayHandler>) -> Router {
    Router::new()
        .route("/", any(handle_webhook))
        .fallback(handle_webhook)
        .with_state(handler)
}

async fn handle_webhook(
    State(handler): State<Arc<RelayHandler>>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> HandlerResponse {
    handler
        .handle(HandlerRequest {
            method,
            query,
            body,
        })
        .await
}

/// Start the webhook server
pub async fn run(config: Config) -> Result<()> {
    let handler = Arc::new(build_handler(&config));
    let app = router(handler);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    info!("Webhook server listening on {}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
