//! Decoder - Push parser over data-framed response bytes
//!
//! Records are newline-delimited lines of the form `data: <json>`, closed by
//! a `data: [DONE]` sentinel. Network chunks split records arbitrarily, so
//! the decoder buffers bytes until a full line is available and decodes one
//! line at a time. Records that fail to parse are logged and skipped; the
//! stream itself is never failed over one bad record.

use log::warn;
use serde::Deserialize;

use crate::event::{DeltaEvent, Framing};

/// Byte length of the `data: ` record prefix.
const PREFIX_LEN: usize = 6;

/// Sentinel payload that terminates a stream.
const TERMINAL: &str = "[DONE]";

/// Incremental decoder for one response stream.
///
/// Not restartable: once the sentinel has been seen, or [`finish`] has been
/// called, further input is ignored.
///
/// [`finish`]: StreamDecoder::finish
#[derive(Debug)]
pub struct StreamDecoder {
    framing: Framing,
    buffer: Vec<u8>,
    /// Last announced role, stamped onto every emitted event.
    role: Option<String>,
    /// Bytes of full text already emitted, for full-replacement suffixing.
    seen_len: usize,
    done: bool,
}

impl StreamDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
            role: None,
            seen_len: 0,
            done: false,
        }
    }

    /// True once the terminal sentinel has been decoded.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume one network chunk and return the events it completes.
    ///
    /// A chunk may close out several buffered records or none at all. Bytes
    /// after the terminal sentinel are discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DeltaEvent> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let record: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&record[..newline]);
            if let Some(event) = self.decode_line(&line) {
                events.push(event);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Flush a trailing record the stream ended without newline-terminating.
    ///
    /// Marks the decoder done; later calls to [`feed`](StreamDecoder::feed)
    /// or `finish` yield nothing.
    pub fn finish(&mut self) -> Vec<DeltaEvent> {
        if self.done {
            return Vec::new();
        }
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let tail = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&tail);
            if let Some(event) = self.decode_line(&line) {
                events.push(event);
            }
        }
        self.done = true;
        events
    }

    fn decode_line(&mut self, line: &str) -> Option<DeltaEvent> {
        // Fixed-width prefix strip; undersized lines resolve to an empty
        // payload and fall out below.
        let payload = line.get(PREFIX_LEN..).unwrap_or("");
        if payload == TERMINAL {
            self.done = true;
            return Some(DeltaEvent::final_marker(self.role.clone()));
        }
        if payload.is_empty() {
            return None;
        }
        match self.framing {
            Framing::Delta => self.decode_delta(payload),
            Framing::FullReplacement => self.decode_replacement(payload),
        }
    }

    fn decode_delta(&mut self, payload: &str) -> Option<DeltaEvent> {
        let frame: ChunkFrame = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("skipping malformed stream record: {err}");
                return None;
            }
        };
        let ChoiceFrame { delta, text } = frame.choices.into_iter().next()?;
        let announced_role = delta.role.is_some();
        if let Some(role) = delta.role {
            self.role = Some(role);
        }
        let fragment = delta.content.or(text).unwrap_or_default();
        if fragment.is_empty() && !announced_role {
            return None;
        }
        Some(DeltaEvent {
            role: self.role.clone(),
            fragment,
            message_id: None,
            conversation_id: None,
            is_final: false,
        })
    }

    fn decode_replacement(&mut self, payload: &str) -> Option<DeltaEvent> {
        let frame: ReplacementFrame = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("skipping malformed stream record: {err}");
                return None;
            }
        };
        let conversation_id = frame.conversation_id;
        let message = match frame.message {
            // Identity-only records still matter when they name the
            // conversation.
            Some(message) => message,
            None => {
                return conversation_id.map(|id| DeltaEvent {
                    role: self.role.clone(),
                    conversation_id: Some(id),
                    ..DeltaEvent::default()
                });
            }
        };
        if message.author.role != "assistant" {
            // The endpoint replays records for other authors; only assistant
            // text belongs to the response.
            return conversation_id.map(|id| DeltaEvent {
                role: self.role.clone(),
                conversation_id: Some(id),
                ..DeltaEvent::default()
            });
        }
        self.role = Some(message.author.role);

        let full = message.content.parts.into_iter().next().unwrap_or_default();
        let fragment = match full.get(self.seen_len..) {
            Some(suffix) => {
                self.seen_len = full.len();
                suffix.to_string()
            }
            // A shorter or boundary-breaking replacement carries no new text.
            None => String::new(),
        };
        Some(DeltaEvent {
            role: self.role.clone(),
            fragment,
            message_id: message.id,
            conversation_id,
            is_final: false,
        })
    }
}

/// Delta-framed record: `choices[0].delta` from the chat endpoint, or
/// `choices[0].text` from the plain completions endpoint.
#[derive(Debug, Default, Deserialize)]
struct ChunkFrame {
    #[serde(default)]
    choices: Vec<ChoiceFrame>,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceFrame {
    #[serde(default)]
    delta: DeltaFields,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DeltaFields {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Full-replacement record from the conversation endpoint.
#[derive(Debug, Deserialize)]
struct ReplacementFrame {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    message: Option<ReplacementMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplacementMessage {
    #[serde(default)]
    id: Option<String>,
    author: AuthorFrame,
    #[serde(default)]
    content: ContentFrame,
}

#[derive(Debug, Deserialize)]
struct AuthorFrame {
    role: String,
}

#[derive(Debug, Default, Deserialize)]
struct ContentFrame {
    #[serde(default)]
    parts: Vec<String>,
}
