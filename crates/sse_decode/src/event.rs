//! Event - What one decoded stream record amounts to

/// How an endpoint frames the text it streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Each record carries only the newly produced text.
    Delta,
    /// Each record carries the entire text so far. The decoder recovers the
    /// increment by suffixing against the previously seen full text.
    FullReplacement,
}

/// One structured update decoded from the stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaEvent {
    /// Announced speaker role. Sticky: once a record announces a role, every
    /// later event carries it until some record announces another.
    pub role: Option<String>,
    /// Text produced since the previous event. May be empty on events that
    /// only carry identity updates or a role announcement.
    pub fragment: String,
    /// Server-assigned id of the message being streamed.
    pub message_id: Option<String>,
    /// Server-assigned conversation id.
    pub conversation_id: Option<String>,
    /// Set on the event for the terminal sentinel; nothing follows it.
    pub is_final: bool,
}

impl DeltaEvent {
    /// The terminal event emitted when the sentinel record arrives.
    pub(crate) fn final_marker(role: Option<String>) -> Self {
        Self {
            role,
            is_final: true,
            ..Self::default()
        }
    }
}
