use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use crate::llm::ModelFamily;

/// Placeholder the prompt template substitutes the user's question into.
pub const QUESTION_PLACEHOLDER: &str = "{question}";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("prompt template must contain the {{question}} placeholder")]
    MissingPlaceholder,
    #[error("prompt template must contain {{question}} only once")]
    RepeatedPlaceholder,
    #[error("{name} must be between 0.0 and 1.0, got {value}")]
    OutOfRange { name: &'static str, value: f32 },
    #[error("max_tokens must be greater than zero")]
    ZeroMaxTokens,
    #[error("webhook path must start with '/', got {0:?}")]
    BadWebhookPath(String),
    #[error("unknown transport {0:?} (expected webhook, polling or lambda)")]
    UnknownTransport(String),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Webhook,
    Polling,
    Lambda,
}

impl std::str::FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webhook" => Ok(TransportMode::Webhook),
            "polling" => Ok(TransportMode::Polling),
            "lambda" => Ok(TransportMode::Lambda),
            other => Err(ConfigError::UnknownTransport(other.to_string())),
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Webhook => write!(f, "webhook"),
            TransportMode::Polling => write!(f, "polling"),
            TransportMode::Lambda => write!(f, "lambda"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default)]
    pub mode: TransportMode,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            listen_addr: default_listen_addr(),
            webhook_path: default_webhook_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Bedrock model identifier, e.g. `amazon.titan-text-express-v1`.
    #[serde(default)]
    pub model_id: String,
    /// AWS region; falls back to the SDK's default provider chain when unset.
    #[serde(default)]
    pub region: Option<String>,
    /// Request/response shape. Inferred from `model_id` when unset.
    #[serde(default)]
    pub family: Option<ModelFamily>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    /// Keep prior question/answer turns per chat for the process lifetime.
    #[serde(default)]
    pub session_memory: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            region: None,
            family: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            prompt_template: default_prompt_template(),
            session_memory: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecretsConfig {
    /// Secrets Manager secret name or ARN. Lookup is skipped when unset.
    #[serde(default)]
    pub secret_id: Option<String>,
    #[serde(default = "default_token_key")]
    pub token_key: String,
    #[serde(default = "default_model_id_key")]
    pub model_id_key: String,
    #[serde(default = "default_region_key")]
    pub region_key: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            secret_id: None,
            token_key: default_token_key(),
            model_id_key: default_model_id_key(),
            region_key: default_region_key(),
        }
    }
}

/// Fixed texts sent back to the chat when there is no model answer.
#[derive(Debug, Deserialize, Clone)]
pub struct MessagesConfig {
    #[serde(default = "default_ask_usage")]
    pub ask_usage: String,
    #[serde(default = "default_unavailable")]
    pub unavailable: String,
    #[serde(default = "default_busy")]
    pub busy: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            ask_usage: default_ask_usage(),
            unavailable: default_unavailable(),
            busy: default_busy(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DispatchConfig {
    /// How many recent update ids to remember for replay detection. 0 disables it.
    #[serde(default)]
    pub dedupe_window: usize,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_prompt_template() -> String {
    "You are an experienced dating and relationship coach. \
     You answer frankly and without judgement, staying on topic.\n\n\
     Question: {question}\n\n\
     Answer the question directly and honestly."
        .to_string()
}

fn default_token_key() -> String {
    "TG_TOKEN".to_string()
}

fn default_model_id_key() -> String {
    "AWS_BEDROCK_MODEL_ID".to_string()
}

fn default_region_key() -> String {
    "AWS_REGION".to_string()
}

fn default_ask_usage() -> String {
    "Ask your question with the command /ask <your question>.".to_string()
}

fn default_unavailable() -> String {
    "The service is temporarily unavailable. Please try again later.".to_string()
}

fn default_busy() -> String {
    "Too many questions right now. Please try again in a minute.".to_string()
}

impl Config {
    /// Load the TOML file at `path`, then apply environment overrides.
    /// A missing file yields the defaults so env-only deployments work.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay values from the environment. `lookup` is injected so tests don't touch
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("TG_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(model_id) = get("AWS_BEDROCK_MODEL_ID") {
            self.model.model_id = model_id;
        }
        if let Some(region) = get("AWS_REGION") {
            self.model.region = Some(region);
        }
        if let Some(secret_id) = get("BOT_SECRET_ID") {
            self.secrets.secret_id = Some(secret_id);
        }
        if let Some(mode) = get("BOT_TRANSPORT") {
            self.transport.mode = mode.parse()?;
        }
        if let Some(addr) = get("BOT_LISTEN_ADDR") {
            match addr.parse() {
                Ok(addr) => self.transport.listen_addr = addr,
                Err(e) => tracing::warn!("Ignoring BOT_LISTEN_ADDR {:?}: {}", addr, e),
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let occurrences = self
            .model
            .prompt_template
            .matches(QUESTION_PLACEHOLDER)
            .count();
        match occurrences {
            0 => return Err(ConfigError::MissingPlaceholder),
            1 => {}
            _ => return Err(ConfigError::RepeatedPlaceholder),
        }

        for (name, value) in [
            ("temperature", self.model.temperature),
            ("top_p", self.model.top_p),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }

        if self.model.max_tokens == 0 {
            return Err(ConfigError::ZeroMaxTokens);
        }

        if !self.transport.webhook_path.starts_with('/') {
            return Err(ConfigError::BadWebhookPath(
                self.transport.webhook_path.clone(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.transport.mode, TransportMode::Webhook);
        assert_eq!(config.transport.webhook_path, "/webhook");
        assert_eq!(config.model.temperature, 0.7);
        assert_eq!(config.model.max_tokens, 1024);
        assert!(!config.model.session_memory);
        assert_eq!(config.dispatch.dedupe_window, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_file() {
        let config = Config::parse(
            r#"
            [telegram]
            bot_token = "123:abc"

            [transport]
            mode = "polling"
            listen_addr = "127.0.0.1:9000"

            [model]
            model_id = "amazon.nova-micro-v1:0"
            region = "us-east-1"
            family = "chat"
            session_memory = true

            [messages]
            ask_usage = "Use /ask <question>"
            "#,
        )
        .unwrap();

        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.transport.mode, TransportMode::Polling);
        assert_eq!(config.transport.listen_addr.port(), 9000);
        assert_eq!(config.model.family, Some(ModelFamily::Chat));
        assert_eq!(config.model.region.as_deref(), Some("us-east-1"));
        assert!(config.model.session_memory);
        assert_eq!(config.messages.ask_usage, "Use /ask <question>");
        assert_eq!(config.messages.unavailable, default_unavailable());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::parse(
            r#"
            [telegram]
            bot_token = "from-file"
            [model]
            model_id = "amazon.titan-text-express-v1"
            "#,
        )
        .unwrap();

        config
            .apply_env(env(&[
                ("TG_TOKEN", "from-env"),
                ("AWS_REGION", "eu-central-1"),
                ("BOT_TRANSPORT", "Lambda"),
                ("BOT_SECRET_ID", "prod/askbot"),
            ]))
            .unwrap();

        assert_eq!(config.telegram.bot_token, "from-env");
        assert_eq!(config.model.model_id, "amazon.titan-text-express-v1");
        assert_eq!(config.model.region.as_deref(), Some("eu-central-1"));
        assert_eq!(config.transport.mode, TransportMode::Lambda);
        assert_eq!(config.secrets.secret_id.as_deref(), Some("prod/askbot"));
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let mut config = Config::default();
        config.telegram.bot_token = "keep".to_string();
        config.apply_env(env(&[("TG_TOKEN", "  ")])).unwrap();
        assert_eq!(config.telegram.bot_token, "keep");
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("BOT_TRANSPORT", "carrier-pigeon")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownTransport("carrier-pigeon".to_string())
        );
    }

    #[test]
    fn test_template_needs_single_placeholder() {
        let mut config = Config::default();
        config.model.prompt_template = "no placeholder".to_string();
        assert_eq!(config.validate(), Err(ConfigError::MissingPlaceholder));

        config.model.prompt_template = "{question} and {question}".to_string();
        assert_eq!(config.validate(), Err(ConfigError::RepeatedPlaceholder));
    }

    #[test]
    fn test_parameter_ranges() {
        let mut config = Config::default();
        config.model.temperature = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                name: "temperature",
                ..
            })
        ));

        let mut config = Config::default();
        config.model.max_tokens = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroMaxTokens));

        let mut config = Config::default();
        config.transport.webhook_path = "webhook".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadWebhookPath(_))
        ));
    }
}
