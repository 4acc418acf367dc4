mod bot;
mod config;
mod dispatch;
mod llm;
mod memory;
mod platform;
mod secrets;
#[cfg(test)]
mod testing;
mod update;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::{Config, TransportMode};
use crate::llm::bedrock::BedrockModel;
use crate::llm::ModelAdapter;
use crate::memory::SessionMemory;
use crate::platform::telegram::{self, TelegramSender};
use crate::platform::webhook;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,askbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let mut sdk_config = load_aws_config(config.model.region.clone()).await;

    if let Some(secret_id) = config.secrets.secret_id.clone() {
        match secrets::fetch(&sdk_config, &secret_id, &config.secrets).await {
            Ok(values) => {
                let region_before = config.model.region.clone();
                values.fill(&mut config);
                if config.model.region != region_before {
                    sdk_config = load_aws_config(config.model.region.clone()).await;
                }
            }
            Err(e) => warn!("Continuing without managed secret: {:#}", e),
        }
    }

    if config.telegram.bot_token.trim().is_empty() {
        bail!("No Telegram bot token configured (set TG_TOKEN, [telegram].bot_token or a managed secret)");
    }

    info!("Configuration loaded successfully");
    info!("  Transport: {}", config.transport.mode);
    info!(
        "  Region: {}",
        sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "<unset>".to_string())
    );
    info!("  Session memory: {}", config.model.session_memory);
    info!("  Dedupe window: {}", config.dispatch.dedupe_window);

    let bot = Bot::new(&config.telegram.bot_token);
    let bot_username = telegram::check_token(&bot).await;

    let model = build_model(&sdk_config, &config);
    let sender = Arc::new(TelegramSender::new(bot.clone()));
    let state = Arc::new(
        AppState::new(sender, model, config.messages.clone())
            .with_dedupe(config.dispatch.dedupe_window)
            .with_bot_username(bot_username),
    );

    if state.is_degraded() {
        warn!("Running degraded: every /ask will be answered with the apology message");
    }

    info!("Bot is starting...");
    match config.transport.mode {
        TransportMode::Webhook => {
            webhook::serve(
                state,
                config.transport.listen_addr,
                &config.transport.webhook_path,
            )
            .await?
        }
        TransportMode::Polling => telegram::run_polling(bot, state).await?,
        TransportMode::Lambda => run_lambda(state).await?,
    }

    Ok(())
}

async fn load_aws_config(region: Option<String>) -> SdkConfig {
    let region = RegionProviderChain::first_try(region.map(Region::new)).or_default_provider();
    aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .load()
        .await
}

/// A model that can't be set up leaves the bot running without one.
fn build_model(sdk_config: &SdkConfig, config: &Config) -> Option<ModelAdapter> {
    let client = aws_sdk_bedrockruntime::Client::new(sdk_config);
    match BedrockModel::new(client, &config.model) {
        Ok(model) => {
            info!("  Model: {}", model.model_id());
            let adapter = ModelAdapter::new(Arc::new(model));
            if config.model.session_memory {
                Some(adapter.with_memory(SessionMemory::new()))
            } else {
                Some(adapter)
            }
        }
        Err(e) => {
            warn!("Model client unavailable: {:#}", e);
            None
        }
    }
}

#[cfg(feature = "lambda")]
async fn run_lambda(state: Arc<AppState>) -> Result<()> {
    platform::lambda::serve(state).await
}

#[cfg(not(feature = "lambda"))]
async fn run_lambda(_state: Arc<AppState>) -> Result<()> {
    bail!("Built without Lambda support; rebuild with `--features lambda`")
}
