//! Stub collaborators for unit tests.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::bot::AppState;
use crate::config::MessagesConfig;
use crate::llm::{LanguageModel, ModelAdapter, ModelError};
use crate::memory::Turn;
use crate::platform::ReplySender;

type Reply = Box<dyn Fn() -> Result<String, ModelError> + Send + Sync>;

/// Model that returns a canned result and records every call.
pub struct StubModel {
    reply: Reply,
    calls: Mutex<Vec<(String, Vec<Turn>)>>,
}

impl StubModel {
    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self {
            reply: Box::new(move || Ok(text.clone())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing<F>(error: F) -> Self
    where
        F: Fn() -> ModelError + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(move || Err(error())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn calls(&self) -> Vec<(String, Vec<Turn>)> {
        self.calls.lock().await.clone()
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|(prompt, _)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String, ModelError> {
        self.calls
            .lock()
            .await
            .push((prompt.to_string(), history.to_vec()));
        (self.reply)()
    }
}

/// Sender that records `(chat_id, text)` pairs, optionally failing each send.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(i64, String)>>,
    fail: bool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ReplySender for RecordingSender {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.lock().await.push((chat_id, text.to_string()));
        if self.fail {
            bail!("chat {} not reachable", chat_id);
        }
        Ok(())
    }
}

pub fn state_with(sender: Arc<RecordingSender>, model: Option<Arc<StubModel>>) -> AppState {
    let model = model.map(|m| ModelAdapter::new(m as Arc<dyn LanguageModel>));
    AppState::new(sender, model, MessagesConfig::default())
}
