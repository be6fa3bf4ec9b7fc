//! Message - Speaker roles and message identity
//!
//! Messages are value types. The conversation log never mutates a message in
//! place; streamed updates replace the whole current message.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Who authored a message.
///
/// The wire protocols overload the role field with arbitrary speaker names.
/// Anything outside the closed set resolves to `Named` exactly once, at
/// construction, and is never re-inferred downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    /// A named speaker outside the closed role set.
    Named(String),
}

impl Role {
    /// Resolve a wire role string to a `Role`.
    pub fn parse(value: &str) -> Self {
        match value {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => Role::Named(other.to_string()),
        }
    }

    /// The wire form of the role: lowercase keyword, or the speaker name.
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Named(name) => name,
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Role::Assistant)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Role::parse(&value))
    }
}

/// One message in a conversation.
///
/// Every message carries its own id and a parent id. Messages created without
/// an explicit parent synthesize one, so root messages still form a valid
/// link target for later children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub parent_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a message with a fresh id and a synthesized parent id.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn named(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Named(name.into()), content)
    }

    /// Replace the generated id, e.g. with a server-assigned one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Link this message under an existing message id.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = parent_id.into();
        self
    }
}
