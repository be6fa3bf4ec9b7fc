//! Web - The web conversation dialect
//!
//! Talks to the browser client's `conversation` endpoint through a proxy
//! prefix. The service holds history server-side, so each request carries
//! only the newest message, replies stream as full replacements, and both
//! the conversation id and the reply's message id are adopted from the
//! stream rather than minted locally.

use std::sync::{Mutex, PoisonError};

use serde_json::{json, Value};

use chat_core::{Conversation, Message, WindowSelection};
use chrono::Local;
use sse_decode::Framing;

use crate::backend::{Backend, ParentLink};
use crate::options::WebChatOptions;
use crate::payload::ConversationMessage;

pub struct WebChatBackend {
    options: WebChatOptions,
    /// Conversation id assigned by the server, carried into every request
    /// after the stream first names it.
    server_conversation: Mutex<Option<String>>,
}

impl WebChatBackend {
    pub fn new(options: WebChatOptions) -> Self {
        Self {
            options,
            server_conversation: Mutex::new(None),
        }
    }

    /// Resume a server-side conversation by id.
    pub fn with_conversation_id(self, id: impl Into<String>) -> Self {
        *self
            .server_conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id.into());
        self
    }

    pub fn options(&self) -> &WebChatOptions {
        &self.options
    }

    pub fn server_conversation_id(&self) -> Option<String> {
        self.server_conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Minutes west of UTC, the sign convention the web client sends.
fn timezone_offset_min() -> i32 {
    -(Local::now().offset().local_minus_utc() / 60)
}

impl Backend for WebChatBackend {
    fn model_name(&self) -> &str {
        self.options.model.as_str()
    }

    fn endpoint(&self) -> String {
        format!("{}conversation", self.options.api_prefix)
    }

    fn credential(&self) -> &str {
        &self.options.access_token
    }

    fn framing(&self) -> Framing {
        Framing::FullReplacement
    }

    fn parent_link(&self) -> ParentLink {
        ParentLink::LastMessageParent
    }

    /// The web service injects its own instructions; none are sent.
    fn initial_system_message(&self) -> Option<Message> {
        None
    }

    fn select_window(&self, conversation: &Conversation) -> WindowSelection {
        match conversation.current() {
            Some(message) => WindowSelection {
                messages: vec![message.clone()],
                token_total: 0,
            },
            None => WindowSelection::empty(),
        }
    }

    fn build_request(&self, window: &WindowSelection) -> Value {
        let messages: Vec<ConversationMessage> = window
            .messages
            .iter()
            .map(ConversationMessage::from_message)
            .collect();
        // The reply is parented where the outgoing message already hangs.
        let parent_message_id = window
            .messages
            .first()
            .map(|message| message.parent_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut body = json!({
            "action": "next",
            "messages": messages,
            "parent_message_id": parent_message_id,
            "model": self.options.model.as_str(),
            "timezone_offset_min": timezone_offset_min(),
            "variant_purpose": "none",
        });
        // Omitted entirely, not null, until the server names the conversation.
        if let Some(id) = self.server_conversation_id() {
            body["conversation_id"] = json!(id);
        }
        body
    }

    fn note_conversation_id(&self, id: &str) {
        *self
            .server_conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id.to_string());
    }
}
