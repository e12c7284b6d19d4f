use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    /// Fixed token. When unset the token is read from `token_env` on every request.
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
    #[serde(default = "default_platform_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,
}

/// User-facing texts sent to the chat or returned from the setup endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct MessagesConfig {
    #[serde(default = "default_welcome")]
    pub welcome: String,
    #[serde(default = "default_thinking")]
    pub thinking: String,
    #[serde(default = "default_fallback")]
    pub fallback: String,
    #[serde(default = "default_error_prefix")]
    pub error_prefix: String,
    #[serde(default = "default_webhook_registered")]
    pub webhook_registered: String,
}

/// Where the bot token comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum BotToken {
    Fixed(Option<String>),
    /// Re-read on every call so a rotated token is picked up without a restart.
    Env(String),
}

impl BotToken {
    /// The configured token, or `None` when it is missing or empty.
    pub fn resolve(&self) -> Option<String> {
        let token = match self {
            BotToken::Fixed(token) => token.clone(),
            BotToken::Env(var) => std::env::var(var).ok(),
        };
        token.filter(|t| !t.trim().is_empty())
    }

    /// Name used in the "not configured" error.
    pub fn name(&self) -> &str {
        match self {
            BotToken::Fixed(_) => DEFAULT_TOKEN_ENV,
            BotToken::Env(var) => var,
        }
    }
}

impl TelegramConfig {
    pub fn token_source(&self) -> BotToken {
        match &self.bot_token {
            Some(token) => BotToken::Fixed(Some(token.clone())),
            None => BotToken::Env(self.token_env.clone()),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            token_env: default_token_env(),
            api_url: default_api_url(),
            parse_mode: default_parse_mode(),
            timeout_secs: default_platform_timeout(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: default_inference_url(),
            model: default_model(),
            timeout_secs: default_inference_timeout(),
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            welcome: default_welcome(),
            thinking: default_thinking(),
            fallback: default_fallback(),
            error_prefix: default_error_prefix(),
            webhook_registered: default_webhook_registered(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_parse_mode() -> String {
    "Markdown".to_string()
}

fn default_platform_timeout() -> u64 {
    10
}

fn default_inference_url() -> String {
    "https://functions.poehali.dev/0a0e0a33-b555-4ac3-8ed6-b952de2816f7".to_string()
}

fn default_model() -> String {
    "llama".to_string()
}

fn default_inference_timeout() -> u64 {
    30
}

fn default_welcome() -> String {
    "👋 Привет! Я локальный ИИ-ассистент.\n\n\
     Могу помочь с:\n\
     • Программированием (Python, JavaScript, React)\n\
     • Математикой и решением задач\n\
     • Научными вопросами (физика, химия, биология)\n\
     • Общими знаниями (история, философия)\n\n\
     Просто задай любой вопрос! 🚀"
        .to_string()
}

fn default_thinking() -> String {
    "⏳ Думаю...".to_string()
}

fn default_fallback() -> String {
    "Извините, не удалось получить ответ".to_string()
}

fn default_error_prefix() -> String {
    "Ошибка при обращении к ИИ: ".to_string()
}

fn default_webhook_registered() -> String {
    "Webhook установлен успешно!".to_string()
}

impl Config {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.telegram.api_url, "https://api.telegram.org");
        assert_eq!(config.telegram.parse_mode, "Markdown");
        assert_eq!(config.telegram.timeout_secs, 10);
        assert_eq!(config.inference.model, "llama");
        assert_eq!(config.inference.timeout_secs, 30);
        assert_eq!(config.messages.thinking, "⏳ Думаю...");
        assert!(config.messages.welcome.starts_with("👋 Привет!"));
    }

    #[test]
    fn test_token_defaults_to_env_source() {
        let config = Config::parse("").unwrap();
        assert_eq!(
            config.telegram.token_source(),
            BotToken::Env("TELEGRAM_BOT_TOKEN".to_string())
        );
    }

    #[test]
    fn test_fixed_token_from_file() {
        let config = Config::parse(
            r#"
[telegram]
bot_token = "123:abc"
api_url = "http://localhost:9000"
"#,
        )
        .unwrap();
        let source = config.telegram.token_source();
        assert_eq!(source.resolve().as_deref(), Some("123:abc"));
        assert_eq!(config.telegram.api_url, "http://localhost:9000");
    }

    #[test]
    fn test_empty_token_is_missing() {
        assert_eq!(BotToken::Fixed(Some("  ".to_string())).resolve(), None);
        assert_eq!(BotToken::Fixed(None).resolve(), None);
    }

    #[test]
    fn test_env_token_read_on_each_resolve() {
        let var = "RELAYBOT_TEST_TOKEN_ROTATION";
        let source = BotToken::Env(var.to_string());
        std::env::remove_var(var);
        assert_eq!(source.resolve(), None);

        std::env::set_var(var, "first");
        assert_eq!(source.resolve().as_deref(), Some("first"));

        std::env::set_var(var, "second");
        assert_eq!(source.resolve().as_deref(), Some("second"));
        std::env::remove_var(var);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
bind = "127.0.0.1:3000"

[inference]
url = "http://localhost:1/ai"
model = "mistral"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.inference.url, "http://localhost:1/ai");
        assert_eq!(config.inference.model, "mistral");
        assert_eq!(config.inference.timeout_secs, 30);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = Config::load(Path::new("/nonexistent/relaybot.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }

    #[test]
    fn test_invalid_toml_fails() {
        assert!(Config::parse("[server\nbind = 1").is_err());
    }
}
