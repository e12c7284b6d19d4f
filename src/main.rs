mod bot;
mod config;
mod llm;
mod platform;
mod relay;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{BotToken, Config};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;

    info!("  Bind: {}", config.server.bind);
    info!("  Telegram API: {}", config.telegram.api_url);
    info!("  Inference: {} (model {})", config.inference.url, config.inference.model);

    let token = config.telegram.token_source();
    match &token {
        BotToken::Fixed(_) => info!("  Bot token: from config file"),
        BotToken::Env(var) => info!("  Bot token: ${} (read per request)", var),
    }
    if token.resolve().is_none() {
        warn!("{} not configured; Telegram-facing requests will fail", token.name());
    }

    bot::run(config).await?;

    Ok(())
}

/// An explicit path must exist; the default `config.toml` is optional.
fn load_config() -> Result<Config> {
    if let Some(path) = std::env::args().nth(1).map(PathBuf::from) {
        info!("Loading configuration from: {}", path.display());
        return Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        info!("Loading configuration from: {}", default_path.display());
        return Config::load(default_path);
    }

    info!("No config file, using defaults");
    Ok(Config::default())
}
