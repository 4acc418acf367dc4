pub mod bedrock;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::QUESTION_PLACEHOLDER;
use crate::memory::{SessionMemory, Turn};

/// Request/response shape spoken by the configured model.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Flat text in, flat text out (Titan style).
    Completion,
    /// Role/content message list (Nova style).
    Chat,
}

impl ModelFamily {
    /// Guess the family from a Bedrock model id.
    pub fn infer(model_id: &str) -> Option<Self> {
        let id = model_id.to_ascii_lowercase();
        if id.contains("titan") {
            Some(ModelFamily::Completion)
        } else if id.contains("nova") {
            Some(ModelFamily::Chat)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFamily::Completion => write!(f, "completion"),
            ModelFamily::Chat => write!(f, "chat"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("not authorized to invoke the model: {0}")]
    Unauthorized(String),
    #[error("model request rejected: {0}")]
    Invalid(String),
    #[error("model provider is throttling requests: {0}")]
    Throttled(String),
    #[error("network error talking to the model provider: {0}")]
    Network(String),
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
    #[error("model provider error: {0}")]
    Provider(String),
}

/// A text generation backend. The answer depends only on the prompt and the
/// history passed in.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String, ModelError>;
}

/// Instruction text wrapped around every question.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn render(&self, question: &str) -> String {
        self.template.replacen(QUESTION_PLACEHOLDER, question, 1)
    }
}

/// Model plus optional per-chat session memory.
#[derive(Clone)]
pub struct ModelAdapter {
    model: Arc<dyn LanguageModel>,
    memory: Option<SessionMemory>,
}

impl ModelAdapter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            memory: None,
        }
    }

    pub fn with_memory(mut self, memory: SessionMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Ask the model. On success the turn is appended to the chat's history
    /// when session memory is enabled.
    pub async fn generate(&self, chat_id: i64, prompt: &str) -> Result<String, ModelError> {
        let history = match &self.memory {
            Some(memory) => memory.history(chat_id).await,
            None => Vec::new(),
        };

        debug!(
            "Invoking model for chat {} with {} prior turn(s)",
            chat_id,
            history.len()
        );
        let reply = self.model.generate(prompt, &history).await?;

        if let Some(memory) = &self.memory {
            memory.append(chat_id, Turn::new(prompt, reply.clone())).await;
        }

        Ok(reply)
    }
}
