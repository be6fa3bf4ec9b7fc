//! Window - Token-budget selection of the outbound context
//!
//! Chooses the conversation prefix that fits a token budget. Selection is
//! oldest-first and order-preserving, and the opening system message is
//! always kept.

use crate::conversation::Conversation;
use crate::message::Message;
use crate::token::TokenCounter;

/// Tokens held back from a model's input ceiling before windowing, when the
/// ceiling is large enough to afford the reserve.
pub const TRUNCATE_RESERVE: u32 = 256;

/// Windowing budget for a model ceiling: the reserve applies only at or
/// above the reserve itself, otherwise the full ceiling is the budget.
pub fn truncate_limit(max_tokens: u32) -> u32 {
    if max_tokens < TRUNCATE_RESERVE {
        max_tokens
    } else {
        max_tokens - TRUNCATE_RESERVE
    }
}

/// The selected prefix and its estimated token cost.
///
/// `token_total` counts included messages only. It can exceed the budget in
/// exactly one case: a system message that alone is over budget, since that
/// message is never dropped.
#[derive(Debug, Clone)]
pub struct WindowSelection {
    pub messages: Vec<Message>,
    pub token_total: u32,
}

impl WindowSelection {
    /// A selection carrying nothing.
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            token_total: 0,
        }
    }
}

/// Budget-bounded selection over a conversation.
#[derive(Debug, Clone, Copy)]
pub struct ContextWindow {
    budget: u32,
}

impl ContextWindow {
    pub fn new(budget: u32) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Walk the log oldest-first, keeping messages until the next one would
    /// push the running total past the budget, then stop.
    pub fn select(
        &self,
        conversation: &Conversation,
        counter: &dyn TokenCounter,
        model: &str,
    ) -> WindowSelection {
        let mut selection = WindowSelection::empty();
        for (index, message) in conversation.messages().iter().enumerate() {
            let cost = counter.count(&message.content, model);
            if index == 0 {
                // The system message is kept even when it alone blows the
                // budget; the request then fails upstream rather than being
                // sent without its instructions.
                selection.token_total = selection.token_total.saturating_add(cost);
                selection.messages.push(message.clone());
                continue;
            }
            if selection.token_total.saturating_add(cost) > self.budget {
                break;
            }
            selection.token_total += cost;
            selection.messages.push(message.clone());
        }
        selection
    }
}
