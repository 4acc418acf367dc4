//! The `/ask` command handler.
//!
//! One inbound update produces at most one outbound message:
//! an unparseable body sends nothing and fails, a non-`/ask` message is
//! ignored, an empty question gets the usage text, and every other `/ask`
//! gets either the model's answer or an apology.

use std::collections::{HashSet, VecDeque};

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::bot::AppState;
use crate::config::MessagesConfig;
use crate::llm::ModelError;
use crate::update::{InboundEvent, ParsedUpdate};

pub const ASK_COMMAND: &str = "/ask";

/// What happened to a successfully handled update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The model's answer was sent.
    Answered,
    /// `/ask` without a question; usage text sent.
    PromptedForInput,
    /// The model was unavailable or failed; apology sent.
    Apologized,
    /// Not an `/ask` message; nothing sent.
    Ignored,
    /// Update id already handled; nothing sent.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Success(Outcome),
    Failure(String),
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchResult::Success(_))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            DispatchResult::Success(_) => 200,
            DispatchResult::Failure(_) => 500,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            DispatchResult::Success(_) => json!({ "message": "Success" }),
            DispatchResult::Failure(error) => json!({ "error": error }),
        }
    }
}

/// Bounded set of recently seen update ids.
pub struct RecentUpdates {
    capacity: usize,
    seen: Mutex<(HashSet<i64>, VecDeque<i64>)>,
}

impl RecentUpdates {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: Mutex::new((HashSet::new(), VecDeque::new())),
        }
    }

    /// Returns false if `update_id` was already recorded.
    pub async fn insert(&self, update_id: i64) -> bool {
        let mut guard = self.seen.lock().await;
        let (set, order) = &mut *guard;
        if !set.insert(update_id) {
            return false;
        }
        order.push_back(update_id);
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                set.remove(&oldest);
            }
        }
        true
    }
}

/// The question following `/ask` (or `/ask@botname`), trimmed. `None` when the
/// message is not an `/ask` command, or is addressed to a different bot. With
/// no known username any `@` suffix is accepted.
pub fn ask_argument<'a>(text: &'a str, bot_username: Option<&str>) -> Option<&'a str> {
    let (command, rest) = match text.find(char::is_whitespace) {
        Some(pos) => text.split_at(pos),
        None => (text, ""),
    };
    let (name, addressee) = match command.split_once('@') {
        Some((name, addressee)) => (name, Some(addressee)),
        None => (command, None),
    };
    if name != ASK_COMMAND {
        return None;
    }
    if let (Some(addressee), Some(username)) = (addressee, bot_username) {
        if !addressee.eq_ignore_ascii_case(username) {
            return None;
        }
    }
    Some(rest.trim())
}

fn apology_for<'a>(err: &ModelError, messages: &'a MessagesConfig) -> &'a str {
    match err {
        ModelError::Throttled(_) => messages.busy.as_str(),
        ModelError::Unauthorized(_)
        | ModelError::Invalid(_)
        | ModelError::Network(_)
        | ModelError::MalformedResponse(_)
        | ModelError::Provider(_) => messages.unavailable.as_str(),
    }
}

async fn deliver(state: &AppState, chat_id: i64, text: &str) {
    if let Err(e) = state.sender.send(chat_id, text).await {
        warn!("Failed to send reply to chat {}: {:#}", chat_id, e);
    }
}

/// Handle a raw transport event.
pub async fn handle(state: &AppState, event: &InboundEvent) -> DispatchResult {
    debug!(
        "Inbound event: {} byte body, {} header(s)",
        event.body.len(),
        event.headers.len()
    );

    let update = match ParsedUpdate::from_event(event) {
        Ok(update) => update,
        Err(e) => {
            warn!("Rejecting inbound event: {}", e);
            return DispatchResult::Failure(e.to_string());
        }
    };

    dispatch(state, &update).await
}

/// Handle an already decoded update.
pub async fn dispatch(state: &AppState, update: &ParsedUpdate) -> DispatchResult {
    if let (Some(recent), Some(update_id)) = (&state.recent, update.update_id) {
        if !recent.insert(update_id).await {
            info!("Skipping replayed update {}", update_id);
            return DispatchResult::Success(Outcome::Duplicate);
        }
    }

    let chat_id = update.chat_id();

    let bot_username = state.bot_username.as_deref();
    let Some(question) = update
        .text()
        .and_then(|text| ask_argument(text, bot_username))
    else {
        debug!("Ignoring non-/ask message in chat {}", chat_id);
        return DispatchResult::Success(Outcome::Ignored);
    };

    if question.is_empty() {
        debug!("Empty /ask from {} in chat {}", update.sender_label(), chat_id);
        deliver(state, chat_id, &state.messages.ask_usage).await;
        return DispatchResult::Success(Outcome::PromptedForInput);
    }

    info!("/ask from {} in chat {}", update.sender_label(), chat_id);

    let Some(model) = &state.model else {
        warn!("Model client unavailable, apologizing to chat {}", chat_id);
        deliver(state, chat_id, &state.messages.unavailable).await;
        return DispatchResult::Success(Outcome::Apologized);
    };

    match model.generate(chat_id, question).await {
        Ok(reply) => {
            info!("Answering chat {} ({} chars)", chat_id, reply.len());
            deliver(state, chat_id, &reply).await;
            DispatchResult::Success(Outcome::Answered)
        }
        Err(e) => {
            warn!("Model invocation failed for chat {}: {}", chat_id, e);
            deliver(state, chat_id, apology_for(&e, &state.messages)).await;
            DispatchResult::Success(Outcome::Apologized)
        }
    }
}
