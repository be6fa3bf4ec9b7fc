//! Options - Per-backend construction options
//!
//! Each backend is configured once at construction. Sampling parameters
//! mirror the endpoint defaults; the system message is a template with
//! `{running_model}`, `{knowledge_cutoff}` and `{current_date}` placeholders
//! rendered when the conversation is seeded.

use chrono::{DateTime, Utc};

use crate::model::{ChatModel, InstructModel, WebChatModel};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 1.0;

/// Endpoint the chat and instruct backends talk to.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Proxy prefix the web backend talks to, trailing slash included.
pub const DEFAULT_API_PREFIX: &str = "https://ai.fakeopen.com/api/";

const CHAT_SYSTEM_TEMPLATE: &str = "You are ChatGPT, a large language model powered by \
     {running_model} trained by OpenAI. Answer as concisely as possible. \
     Knowledge cutoff: {knowledge_cutoff} Current date: {current_date}";

const INSTRUCT_SYSTEM_TEMPLATE: &str = "You are InstructGPT, a large language model powered by \
     {running_model} trained by OpenAI. Answer as concisely as possible. \
     Knowledge cutoff: {knowledge_cutoff} Current date: {current_date}";

/// Render a system-message template for a model.
///
/// Timestamps render in the fixed UTC form the service's own web client
/// uses, e.g. `Wed, 01 Sep 2021 00:00:00 GMT`.
pub fn render_system_template(
    template: &str,
    model: &str,
    knowledge_cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> String {
    template
        .replace("{knowledge_cutoff}", &format_utc(knowledge_cutoff))
        .replace("{current_date}", &format_utc(now))
        .replace("{running_model}", model)
}

fn format_utc(stamp: DateTime<Utc>) -> String {
    stamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Configuration for the chat completions backend.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub api_key: String,
    pub model: ChatModel,
    pub temperature: f64,
    pub top_p: f64,
    /// Input ceiling override; `None` uses the model's known ceiling.
    pub max_tokens: Option<u32>,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    /// System message template seeded into fresh conversations.
    pub system_message: String,
    pub base_url: String,
}

impl ChatOptions {
    pub fn new(api_key: impl Into<String>, model: ChatModel) -> Self {
        Self {
            api_key: api_key.into(),
            model,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: None,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            system_message: CHAT_SYSTEM_TEMPLATE.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_frequency_penalty(mut self, frequency_penalty: f64) -> Self {
        self.frequency_penalty = frequency_penalty;
        self
    }

    pub fn with_presence_penalty(mut self, presence_penalty: f64) -> Self {
        self.presence_penalty = presence_penalty;
        self
    }

    pub fn with_system_message(mut self, template: impl Into<String>) -> Self {
        self.system_message = template.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The ceiling requests are budgeted against.
    pub fn effective_max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or_else(|| self.model.max_tokens())
    }
}

/// Configuration for the plain completions backend.
#[derive(Debug, Clone)]
pub struct InstructOptions {
    pub api_key: String,
    pub model: InstructModel,
    pub temperature: f64,
    pub top_p: f64,
    /// Input ceiling override; `None` uses the model's known ceiling.
    pub max_tokens: Option<u32>,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    /// System message template seeded into fresh conversations.
    pub system_message: String,
    pub base_url: String,
}

impl InstructOptions {
    pub fn new(api_key: impl Into<String>, model: InstructModel) -> Self {
        Self {
            api_key: api_key.into(),
            model,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: None,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            system_message: INSTRUCT_SYSTEM_TEMPLATE.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_frequency_penalty(mut self, frequency_penalty: f64) -> Self {
        self.frequency_penalty = frequency_penalty;
        self
    }

    pub fn with_presence_penalty(mut self, presence_penalty: f64) -> Self {
        self.presence_penalty = presence_penalty;
        self
    }

    pub fn with_system_message(mut self, template: impl Into<String>) -> Self {
        self.system_message = template.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn effective_max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or_else(|| self.model.max_tokens())
    }
}

/// Configuration for the web conversation backend.
#[derive(Debug, Clone)]
pub struct WebChatOptions {
    pub access_token: String,
    pub model: WebChatModel,
    /// Conversation endpoint prefix, trailing slash included.
    pub api_prefix: String,
}

impl WebChatOptions {
    pub fn new(access_token: impl Into<String>, model: WebChatModel) -> Self {
        Self {
            access_token: access_token.into(),
            model,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
        }
    }

    pub fn with_api_prefix(mut self, api_prefix: impl Into<String>) -> Self {
        self.api_prefix = api_prefix.into();
        self
    }
}
