//! openai_client - Streaming clients for the OpenAI text endpoints
//!
//! Three dialects of one exchange engine:
//! - [`ChatBackend`] - chat completions, delta-framed streaming
//! - [`InstructBackend`] - plain completions behind an instruction wrapper
//! - [`WebChatBackend`] - the web conversation endpoint, full-replacement
//!   framing and server-held history
//!
//! [`CompletionClient`] owns the conversation and drives one exchange at a
//! time: context windowing, retry-wrapped requests, stream decoding, and
//! per-fragment callbacks. [`AvailabilityCache`] answers which chat models
//! a credential can use.

pub mod availability;
pub mod backend;
pub mod backends;
pub mod client;
pub mod error;
pub mod model;
pub mod options;
pub mod payload;
pub mod retry;

pub use chat_core::{Conversation, Message, Role};

pub use availability::AvailabilityCache;
pub use backend::{Backend, ParentLink};
pub use backends::{ChatBackend, InstructBackend, WebChatBackend};
pub use client::CompletionClient;
pub use error::{Error, ErrorKind, ErrorRecord, Result};
pub use model::{ChatModel, InstructModel, WebChatModel};
pub use options::{ChatOptions, InstructOptions, WebChatOptions};
pub use retry::{Attempt, RetryPolicy};
