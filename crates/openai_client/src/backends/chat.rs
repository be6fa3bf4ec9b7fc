//! Chat - The chat completions dialect
//!
//! Delta-framed streaming against `/chat/completions`. History is resent on
//! every turn, so the outbound window is token-budgeted against the model
//! ceiling, and whatever the window costs is subtracted from the response
//! allowance.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use chat_core::{
    truncate_limit, ContextWindow, Conversation, Message, SharedTokenCounter, WindowSelection,
    WordCountTokenCounter,
};
use sse_decode::Framing;

use crate::backend::{Backend, ParentLink};
use crate::options::{render_system_template, ChatOptions};
use crate::payload::ApiMessage;

pub struct ChatBackend {
    options: ChatOptions,
    counter: SharedTokenCounter,
    window: ContextWindow,
}

impl ChatBackend {
    pub fn new(options: ChatOptions) -> Self {
        Self::with_counter(options, Arc::new(WordCountTokenCounter))
    }

    /// Construct with a custom token counter, e.g. an exact encoder.
    pub fn with_counter(options: ChatOptions, counter: SharedTokenCounter) -> Self {
        let window = ContextWindow::new(truncate_limit(options.effective_max_tokens()));
        Self {
            options,
            counter,
            window,
        }
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }
}

impl Backend for ChatBackend {
    fn model_name(&self) -> &str {
        self.options.model.as_str()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.options.base_url)
    }

    fn credential(&self) -> &str {
        &self.options.api_key
    }

    fn framing(&self) -> Framing {
        Framing::Delta
    }

    fn parent_link(&self) -> ParentLink {
        ParentLink::LastMessageId
    }

    fn initial_system_message(&self) -> Option<Message> {
        Some(Message::system(render_system_template(
            &self.options.system_message,
            self.options.model.as_str(),
            self.options.model.knowledge_cutoff(),
            Utc::now(),
        )))
    }

    fn select_window(&self, conversation: &Conversation) -> WindowSelection {
        self.window
            .select(conversation, self.counter.as_ref(), self.model_name())
    }

    fn build_request(&self, window: &WindowSelection) -> Value {
        let messages: Vec<ApiMessage> = window.messages.iter().map(ApiMessage::chat).collect();
        let response_budget = self
            .options
            .effective_max_tokens()
            .saturating_sub(window.token_total);
        json!({
            "model": self.options.model.as_str(),
            "messages": messages,
            "max_tokens": response_budget,
            "stream": true,
            "temperature": self.options.temperature,
            "top_p": self.options.top_p,
            "frequency_penalty": self.options.frequency_penalty,
            "presence_penalty": self.options.presence_penalty,
        })
    }
}
