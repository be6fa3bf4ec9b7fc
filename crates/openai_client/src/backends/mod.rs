//! Backends - The three endpoint dialects

mod chat;
mod instruct;
mod web;

pub use chat::ChatBackend;
pub use instruct::InstructBackend;
pub use web::WebChatBackend;
