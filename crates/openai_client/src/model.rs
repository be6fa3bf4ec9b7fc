//! Model - The known model catalog
//!
//! Wire identifiers, input ceilings, and knowledge cutoffs for the models
//! each endpoint serves. Ceilings drive the context window budget; cutoffs
//! are rendered into the default system message.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

/// Models served by the chat completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatModel {
    Gpt35Turbo,
    Gpt4,
    Gpt432k,
}

impl ChatModel {
    pub const ALL: [ChatModel; 3] = [ChatModel::Gpt35Turbo, ChatModel::Gpt4, ChatModel::Gpt432k];

    pub fn as_str(self) -> &'static str {
        match self {
            ChatModel::Gpt35Turbo => "gpt-3.5-turbo",
            ChatModel::Gpt4 => "gpt-4",
            ChatModel::Gpt432k => "gpt-4-32k",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|model| model.as_str() == value)
    }

    /// Input token ceiling for requests against this model.
    pub fn max_tokens(self) -> u32 {
        match self {
            ChatModel::Gpt35Turbo => 4097,
            ChatModel::Gpt4 => 8191,
            ChatModel::Gpt432k => 32767,
        }
    }

    /// When this model's training data ends.
    pub fn knowledge_cutoff(self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 9, 1, 0, 0, 0).unwrap()
    }
}

impl Default for ChatModel {
    fn default() -> Self {
        ChatModel::Gpt35Turbo
    }
}

impl fmt::Display for ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Models served by the plain completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructModel {
    Davinci,
    Curie,
    Babbage,
    Ada,
}

impl InstructModel {
    pub const ALL: [InstructModel; 4] = [
        InstructModel::Davinci,
        InstructModel::Curie,
        InstructModel::Babbage,
        InstructModel::Ada,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InstructModel::Davinci => "text-davinci-003",
            InstructModel::Curie => "text-curie-001",
            InstructModel::Babbage => "text-babbage-001",
            InstructModel::Ada => "text-ada-001",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|model| model.as_str() == value)
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            InstructModel::Davinci => 4097,
            _ => 2049,
        }
    }

    pub fn knowledge_cutoff(self) -> DateTime<Utc> {
        match self {
            InstructModel::Davinci => Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap(),
            _ => Utc.with_ymd_and_hms(2019, 9, 1, 0, 0, 0).unwrap(),
        }
    }
}

impl Default for InstructModel {
    fn default() -> Self {
        InstructModel::Davinci
    }
}

impl fmt::Display for InstructModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Models exposed through the web conversation endpoint.
///
/// The web service holds conversation state server-side, so these carry no
/// input ceiling or cutoff here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebChatModel {
    Default,
    Paid,
    Gpt4,
}

impl WebChatModel {
    pub fn as_str(self) -> &'static str {
        match self {
            WebChatModel::Default => "text-davinci-002-render-sha",
            WebChatModel::Paid => "text-davinci-002-render-paid",
            WebChatModel::Gpt4 => "gpt-4",
        }
    }
}

impl Default for WebChatModel {
    fn default() -> Self {
        WebChatModel::Default
    }
}

impl fmt::Display for WebChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
