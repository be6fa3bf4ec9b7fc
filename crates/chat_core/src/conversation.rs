//! Conversation - Append-only message log
//!
//! History only ever grows; the single exception is the current (last)
//! message, which a streaming response replaces wholesale after each frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Message;
use crate::token::TokenCounter;

/// Title given to a conversation before the user or server names it.
pub const DEFAULT_TITLE: &str = "New chat";

/// An ordered conversation log with a stable id.
///
/// Mutation is restricted to appending, replacing the current message, and
/// resetting; earlier messages are immutable once something follows them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    id: String,
    title: String,
    messages: Vec<Message>,
    time_created: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation with a fresh local id.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            time_created: now,
            last_updated: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Adopt an id, e.g. one assigned by the server.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The current message: the most recently appended one.
    pub fn current(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Look a message up by id.
    pub fn get_message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Append a message to the log.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.last_updated = Utc::now();
    }

    /// Replace the current message. A no-op on an empty conversation.
    ///
    /// The replacement carries its own identity; nothing from the displaced
    /// message survives unless the caller copied it over.
    pub fn update_current_message(&mut self, message: Message) {
        if let Some(current) = self.messages.last_mut() {
            *current = message;
            self.last_updated = Utc::now();
        }
    }

    /// Discard all messages and reseed with `system_message` when given.
    pub fn reset(&mut self, system_message: Option<Message>) {
        self.messages.clear();
        if let Some(message) = system_message {
            self.messages.push(message);
        }
        self.last_updated = Utc::now();
    }

    /// Total estimated token cost of every message in the log.
    pub fn count_tokens(&self, counter: &dyn TokenCounter, model: &str) -> u32 {
        self.messages
            .iter()
            .map(|message| counter.count(&message.content, model))
            .fold(0, u32::saturating_add)
    }

    pub fn time_created(&self) -> DateTime<Utc> {
        self.time_created
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
