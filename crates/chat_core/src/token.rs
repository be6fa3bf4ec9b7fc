//! Token - Pluggable token cost estimation
//!
//! Budget math downstream relies on estimates being deterministic and
//! monotone over content growth, never on their exactness.

use std::sync::Arc;

/// Estimates the encoded-token cost of text for a given model.
pub trait TokenCounter: Send + Sync {
    /// Estimated token cost of `content` when sent to `model`.
    fn count(&self, content: &str, model: &str) -> u32;
}

/// Shared handle to a token counter.
pub type SharedTokenCounter = Arc<dyn TokenCounter>;

/// Crude word-count heuristic: whitespace-separated tokens times four.
///
/// Deliberately model-agnostic. Swap in an exact encoder through the
/// [`TokenCounter`] seam when precision matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCountTokenCounter;

impl TokenCounter for WordCountTokenCounter {
    fn count(&self, content: &str, _model: &str) -> u32 {
        (content.split_whitespace().count() as u32).saturating_mul(4)
    }
}
