use std::collections::HashMap;

use anyhow::{Context, Result};
use aws_config::SdkConfig;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use tracing::info;

use crate::config::{Config, SecretsConfig};

/// Values pulled out of a managed secret.
#[derive(Debug, Default, PartialEq)]
pub struct SecretValues {
    pub bot_token: Option<String>,
    pub model_id: Option<String>,
    pub region: Option<String>,
}

impl SecretValues {
    /// A JSON object secret is read by key; a JSON string or anything else is
    /// taken as the bot token.
    pub fn parse(secret: &str, keys: &SecretsConfig) -> Self {
        let secret = secret.trim();
        if let Ok(token) = serde_json::from_str::<String>(secret) {
            let token = token.trim();
            return Self {
                bot_token: (!token.is_empty()).then(|| token.to_string()),
                ..Self::default()
            };
        }
        match serde_json::from_str::<HashMap<String, serde_json::Value>>(secret) {
            Ok(map) => {
                let get = |key: &str| {
                    map.get(key)
                        .and_then(|v| v.as_str())
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                };
                Self {
                    bot_token: get(&keys.token_key),
                    model_id: get(&keys.model_id_key),
                    region: get(&keys.region_key),
                }
            }
            Err(_) if !secret.is_empty() => Self {
                bot_token: Some(secret.to_string()),
                ..Self::default()
            },
            Err(_) => Self::default(),
        }
    }

    /// Fill settings that are still empty. Explicit configuration wins.
    pub fn fill(self, config: &mut Config) {
        if config.telegram.bot_token.trim().is_empty() {
            if let Some(token) = self.bot_token {
                config.telegram.bot_token = token;
            }
        }
        if config.model.model_id.trim().is_empty() {
            if let Some(model_id) = self.model_id {
                config.model.model_id = model_id;
            }
        }
        if config.model.region.is_none() {
            config.model.region = self.region;
        }
    }
}

/// Fetch `secret_id` from AWS Secrets Manager.
pub async fn fetch(sdk_config: &SdkConfig, secret_id: &str, keys: &SecretsConfig) -> Result<SecretValues> {
    let client = aws_sdk_secretsmanager::Client::new(sdk_config);

    let output = client
        .get_secret_value()
        .secret_id(secret_id)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
        .with_context(|| format!("Failed to read secret '{}'", secret_id))?;

    let secret = output
        .secret_string()
        .with_context(|| format!("Secret '{}' has no string value", secret_id))?;

    info!("Loaded secret '{}'", secret_id);
    Ok(SecretValues::parse(secret, keys))
}
