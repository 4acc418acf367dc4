//! Inbound transport envelope and the typed update decoded from it.

use serde::Deserialize;
use thiserror::Error;

/// Raw request as handed over by a transport: the serialized update bytes plus
/// whatever headers came with it. Headers are carried along but not interpreted.
#[derive(Debug, Clone, Default)]
pub struct InboundEvent {
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl InboundEvent {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

#[derive(Debug, Error)]
pub enum UpdateParseError {
    #[error("request body is empty")]
    EmptyBody,
    #[error("request body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("invalid update payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A Telegram update reduced to the fields the bot reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedUpdate {
    #[serde(default)]
    pub update_id: Option<i64>,
    pub message: IncomingMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from: Option<Sender>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl ParsedUpdate {
    /// Decode a webhook body. `message` and `message.chat.id` are required;
    /// the reply has nowhere to go without them.
    pub fn from_event(event: &InboundEvent) -> Result<Self, UpdateParseError> {
        let body = std::str::from_utf8(&event.body)?;
        if body.trim().is_empty() {
            return Err(UpdateParseError::EmptyBody);
        }
        Ok(serde_json::from_str(body)?)
    }

    pub fn chat_id(&self) -> i64 {
        self.message.chat.id
    }

    pub fn text(&self) -> Option<&str> {
        self.message.text.as_deref()
    }

    /// Display name for logs: username, first name, or the numeric id.
    pub fn sender_label(&self) -> String {
        match &self.message.from {
            Some(Sender {
                username: Some(name),
                ..
            }) => format!("@{}", name),
            Some(Sender {
                first_name: Some(name),
                id,
                ..
            }) => format!("{} ({})", name, id),
            Some(sender) => sender.id.to_string(),
            None => "unknown".to_string(),
        }
    }
}
