use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, info, warn};

use super::ReplySender;
use crate::bot::AppState;
use crate::dispatch;
use crate::update::{Chat, IncomingMessage, ParsedUpdate, Sender};

/// Telegram rejects messages longer than 4096 characters.
const MAX_MESSAGE_LEN: usize = 4000;

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Sends replies through the Telegram Bot API.
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ReplySender for TelegramSender {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            self.bot
                .send_message(ChatId(chat_id), chunk)
                .await
                .with_context(|| format!("Failed to send message to chat {}", chat_id))?;
        }
        Ok(())
    }
}

/// Log who the token belongs to and return the bot's username. A bad token
/// shows up here instead of on the first reply.
pub async fn check_token(bot: &Bot) -> Option<String> {
    match bot.get_me().await {
        Ok(me) => {
            info!("Authorized as @{}", me.username());
            Some(me.username().to_string())
        }
        Err(e) => {
            warn!("Telegram getMe failed, replies will likely fail: {}", e);
            None
        }
    }
}

fn to_update(msg: &Message) -> ParsedUpdate {
    ParsedUpdate {
        update_id: None,
        message: IncomingMessage {
            chat: Chat { id: msg.chat.id.0 },
            text: msg.text().map(str::to_string),
            from: msg.from.as_ref().map(|user| Sender {
                id: user.id.0 as i64,
                first_name: Some(user.first_name.clone()),
                username: user.username.clone(),
            }),
        },
    }
}

/// Run the bot with long polling. Each message goes through the same dispatch
/// path as a webhook delivery; the result is only logged.
pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> Result<()> {
    info!("Starting Telegram long polling...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let update = to_update(&msg);
    let result = dispatch::dispatch(&state, &update).await;
    if result.is_success() {
        debug!("Chat {}: {:?}", update.chat_id(), result);
    } else {
        warn!("Chat {}: {:?}", update.chat_id(), result);
    }
    Ok(())
}
