//! Backend - The seam between the exchange engine and the endpoint dialects
//!
//! The engine in `client` owns the conversation, the retry loop, and the
//! stream plumbing; everything endpoint-specific sits behind this trait.

use serde_json::Value;

use chat_core::{Conversation, Message, WindowSelection};
use sse_decode::Framing;

/// Which field of the displaced current message a streamed replacement is
/// parented to. The dialects disagree, and both linkages are preserved.
///
/// The placeholder a stream replaces is always parented to the id of the
/// message before it, so `LastMessageParent` resolves to the user message
/// that prompted the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    /// Parent is the displaced message's own id. Replacements share the
    /// placeholder's id, so the reply ends up linked to itself; that is
    /// what the chat dialect's consumers have always been handed.
    LastMessageId,
    /// Parent is the displaced message's parent id, linking the reply
    /// under the user message.
    LastMessageParent,
}

/// One endpoint dialect: where to send requests, how replies are framed,
/// and how conversation state maps onto the wire.
pub trait Backend: Send + Sync {
    /// Wire id of the running model.
    fn model_name(&self) -> &str;

    /// Full URL of the streaming endpoint.
    fn endpoint(&self) -> String;

    /// Bearer credential sent with every request.
    fn credential(&self) -> &str;

    /// How this endpoint frames streamed text.
    fn framing(&self) -> Framing;

    /// How streamed replacements link into the message tree.
    fn parent_link(&self) -> ParentLink;

    /// System message seeded into fresh conversations, when the dialect
    /// carries one.
    fn initial_system_message(&self) -> Option<Message>;

    /// Choose the slice of the conversation this exchange sends.
    fn select_window(&self, conversation: &Conversation) -> WindowSelection;

    /// Build the request body for the selected window.
    fn build_request(&self, window: &WindowSelection) -> Value;

    /// Clean one streamed fragment before it is applied. `at_start` is true
    /// only for the first fragment of a response.
    fn scrub_fragment(&self, fragment: &str, at_start: bool) -> String {
        let _ = at_start;
        fragment.to_string()
    }

    /// Called when the stream names the server-side conversation, so the
    /// dialect can carry the id into subsequent requests.
    fn note_conversation_id(&self, id: &str) {
        let _ = id;
    }
}
