use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Per-chat conversation history kept for the lifetime of the process.
///
/// Turns are only ever appended; nothing is pruned. Each chat has its own
/// history so concurrent chats never see each other's turns.
#[derive(Clone, Default)]
pub struct SessionMemory {
    chats: Arc<Mutex<HashMap<i64, Vec<Turn>>>>,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the chat's history, oldest first.
    pub async fn history(&self, chat_id: i64) -> Vec<Turn> {
        let chats = self.chats.lock().await;
        chats.get(&chat_id).cloned().unwrap_or_default()
    }

    pub async fn append(&self, chat_id: i64, turn: Turn) {
        let mut chats = self.chats.lock().await;
        let history = chats.entry(chat_id).or_default();
        history.push(turn);
        debug!("Chat {} history now has {} turn(s)", chat_id, history.len());
    }
}
