#[cfg(feature = "lambda")]
pub mod lambda;
pub mod telegram;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;

/// Outbound side of the chat platform: deliver text to a chat.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}
