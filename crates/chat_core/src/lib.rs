//! chat_core - Conversation data model for the completion clients
//!
//! Foundational types shared across the workspace:
//! - `message` - speaker roles and message identity
//! - `conversation` - append-only log with a replaceable current message
//! - `token` - pluggable token cost estimation
//! - `window` - token-budget selection of the outbound context

pub mod conversation;
pub mod message;
pub mod token;
pub mod window;

pub use conversation::Conversation;
pub use message::{Message, Role};
pub use token::{SharedTokenCounter, TokenCounter, WordCountTokenCounter};
pub use window::{truncate_limit, ContextWindow, WindowSelection, TRUNCATE_RESERVE};
