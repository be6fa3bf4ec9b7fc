//! Payload - Outbound message forms
//!
//! The API endpoints and the web conversation endpoint serialize messages
//! differently; both mappings live here so the backends assemble request
//! bodies from ready-made parts.

use serde::Serialize;

use chat_core::{Message, Role};

/// `{role, content}` form used by the chat and completions endpoints.
///
/// Speaker names outside the closed role set travel as `user` plus a `name`
/// field rather than as a role of their own.
#[derive(Debug, Clone, Serialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ApiMessage {
    /// Chat endpoint mapping: lowercase role keywords.
    pub fn chat(message: &Message) -> Self {
        let (role, name) = match &message.role {
            Role::System => ("system".to_string(), None),
            Role::User => ("user".to_string(), None),
            Role::Assistant => ("assistant".to_string(), None),
            Role::Named(name) => ("user".to_string(), Some(name.clone())),
        };
        Self {
            role,
            content: message.content.clone(),
            name,
        }
    }

    /// Instruction-wrapper mapping: capitalized role labels for the
    /// transcript the completions prompt is built from.
    pub fn instruct(message: &Message) -> Self {
        let (role, name) = match &message.role {
            Role::System => ("System".to_string(), None),
            Role::User => ("User".to_string(), None),
            Role::Assistant => ("Assistant".to_string(), None),
            Role::Named(name) => ("user".to_string(), Some(name.clone())),
        };
        Self {
            role,
            content: message.content.clone(),
            name,
        }
    }
}

/// Message form posted to the web conversation endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationMessage {
    pub id: String,
    pub author: ConversationAuthor,
    pub content: ConversationContent,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationAuthor {
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationContent {
    pub content_type: String,
    pub parts: Vec<String>,
}

impl ConversationMessage {
    /// The web endpoint takes the role value as-is, named speakers included.
    pub fn from_message(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            author: ConversationAuthor {
                role: message.role.as_str().to_string(),
            },
            content: ConversationContent {
                content_type: "text".to_string(),
                parts: vec![message.content.clone()],
            },
        }
    }
}
