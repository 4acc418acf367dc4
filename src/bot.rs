use std::sync::Arc;

use crate::config::MessagesConfig;
use crate::dispatch::RecentUpdates;
use crate::llm::ModelAdapter;
use crate::platform::ReplySender;

/// Everything a request needs, built once at startup and shared by reference.
pub struct AppState {
    pub sender: Arc<dyn ReplySender>,
    /// `None` when the model client could not be set up; every `/ask` then gets
    /// the apology text.
    pub model: Option<ModelAdapter>,
    pub messages: MessagesConfig,
    pub recent: Option<RecentUpdates>,
    /// Our username from `getMe`, used to match `/ask@<username>`.
    pub bot_username: Option<String>,
}

impl AppState {
    pub fn new(
        sender: Arc<dyn ReplySender>,
        model: Option<ModelAdapter>,
        messages: MessagesConfig,
    ) -> Self {
        Self {
            sender,
            model,
            messages,
            recent: None,
            bot_username: None,
        }
    }

    /// Remember the last `window` update ids and drop replays. 0 leaves it off.
    pub fn with_dedupe(mut self, window: usize) -> Self {
        self.recent = (window > 0).then(|| RecentUpdates::new(window));
        self
    }

    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.model.is_none()
    }
}
