//! Client - The exchange engine shared by every dialect
//!
//! One exchange: append the user's message, pick the outbound window, send
//! the request under the retry policy, then fold the streamed reply back
//! into the conversation one fragment at a time. The conversation always
//! holds the reply-so-far, so a caller rendering state mid-stream sees
//! exactly what has arrived.
//!
//! A client drives one exchange at a time. The busy flag rejects overlap
//! and clears on every exit, including cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use uuid::Uuid;

use chat_core::{Conversation, Message, Role};
use sse_decode::{DeltaEvent, Framing, StreamDecoder};

use crate::backend::{Backend, ParentLink};
use crate::backends::InstructBackend;
use crate::error::{Error, ErrorRecord, Result};
use crate::retry::{Attempt, RetryPolicy};

/// Streaming client over one endpoint dialect.
///
/// Owns the conversation. Shared handles (`Arc<CompletionClient<_>>`) are
/// the expected way to read state while an exchange streams.
pub struct CompletionClient<B: Backend> {
    backend: B,
    http: Client,
    retry: RetryPolicy,
    conversation: Mutex<Conversation>,
    busy: AtomicBool,
}

impl<B: Backend> CompletionClient<B> {
    /// Create a client with a fresh conversation, seeded with the dialect's
    /// system message when it has one.
    pub fn new(backend: B) -> Self {
        Self::with_conversation(backend, Conversation::new())
    }

    /// Create a client over a restored conversation. An empty conversation
    /// is seeded the same way a fresh one is; a non-empty one is taken
    /// as-is, its system message included.
    pub fn with_conversation(backend: B, mut conversation: Conversation) -> Self {
        if conversation.is_empty() {
            if let Some(system) = backend.initial_system_message() {
                conversation.add_message(system);
            }
        }
        Self {
            backend,
            http: Client::new(),
            retry: RetryPolicy::default(),
            conversation: Mutex::new(conversation),
            busy: AtomicBool::new(false),
        }
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether an exchange is currently streaming.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Snapshot of the conversation, reply-so-far included.
    pub fn conversation(&self) -> Conversation {
        self.lock_conversation().clone()
    }

    /// Discard the conversation and reseed it. Rejected while streaming.
    pub fn reset(&self) -> Result<()> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        self.lock_conversation()
            .reset(self.backend.initial_system_message());
        Ok(())
    }

    /// Run one full exchange and return the final reply message.
    ///
    /// `user_text`, when given, is appended as a user message parented to
    /// the current last message before anything is sent; `None` re-asks
    /// over the history as it stands. `on_delta` fires once per applied
    /// fragment with the fragment message and the reply-so-far.
    pub async fn exchange<F>(&self, user_text: Option<&str>, mut on_delta: F) -> Result<Message>
    where
        F: FnMut(&Message, &Message),
    {
        let _busy = BusyGuard::acquire(&self.busy)?;

        if let Some(text) = user_text {
            let mut conversation = self.lock_conversation();
            let message = match conversation.current() {
                Some(last) => Message::user(text).with_parent(last.id.clone()),
                None => Message::user(text),
            };
            conversation.add_message(message);
        }

        let (endpoint, body) = {
            let conversation = self.lock_conversation();
            let window = self.backend.select_window(&conversation);
            debug!(
                "sending {} windowed message(s), {} token(s)",
                window.messages.len(),
                window.token_total
            );
            (self.backend.endpoint(), self.backend.build_request(&window))
        };

        let response = self.send_with_retry(&endpoint, &body).await?;
        self.consume_stream(response, &mut on_delta).await
    }

    /// [`exchange`](CompletionClient::exchange) without a streaming callback.
    pub async fn ask(&self, user_text: &str) -> Result<Message> {
        self.exchange(Some(user_text), |_, _| {}).await
    }

    fn lock_conversation(&self) -> MutexGuard<'_, Conversation> {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn send_with_retry(&self, endpoint: &str, body: &Value) -> Result<Response> {
        let model = self.backend.model_name().to_string();
        self.retry
            .run(|| async {
                info!("POST {endpoint}");
                let response = self
                    .http
                    .post(endpoint)
                    .header("Authorization", format!("Bearer {}", self.backend.credential()))
                    .json(body)
                    .send()
                    .await?;
                Ok(classify_response(response, &model).await)
            })
            .await
    }

    /// Fold the streamed reply into the conversation.
    async fn consume_stream<F>(&self, response: Response, on_delta: &mut F) -> Result<Message>
    where
        F: FnMut(&Message, &Message),
    {
        let response_id = Uuid::new_v4().to_string();
        let seed = {
            let mut conversation = self.lock_conversation();
            let mut seed = Message::assistant("").with_id(response_id.clone());
            if let Some(last) = conversation.current() {
                seed = seed.with_parent(last.id.clone());
            }
            conversation.add_message(seed.clone());
            seed
        };

        let mut decoder = StreamDecoder::new(self.backend.framing());
        let mut state = StreamState::new(response_id, seed);

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in decoder.feed(&chunk) {
                self.apply_event(event, &mut state, on_delta);
            }
            if decoder.is_done() {
                break;
            }
        }
        for event in decoder.finish() {
            self.apply_event(event, &mut state, on_delta);
        }

        debug!("stream complete: {} byte reply", state.last.content.len());
        Ok(state.last)
    }

    /// Apply one decoded event: adopt ids, scrub the fragment, replace the
    /// current message, then hand both forms to the callback.
    fn apply_event<F>(&self, event: DeltaEvent, state: &mut StreamState, on_delta: &mut F)
    where
        F: FnMut(&Message, &Message),
    {
        if event.is_final {
            return;
        }

        if let Some(id) = event.conversation_id {
            {
                let mut conversation = self.lock_conversation();
                if conversation.id() != id {
                    conversation.set_id(id.clone());
                }
            }
            self.backend.note_conversation_id(&id);
        }
        if let Some(id) = event.message_id {
            state.current_id = id;
        }
        if let Some(role) = &event.role {
            state.role = Some(Role::parse(role));
        }
        if event.fragment.is_empty() {
            return;
        }

        let at_start = !state.scrubbed_any;
        state.scrubbed_any = true;
        let fragment = self.backend.scrub_fragment(&event.fragment, at_start);
        if fragment.is_empty() {
            return;
        }

        state.full_text.push_str(&fragment);
        let role = state.role.clone().unwrap_or(Role::Assistant);

        let (full, piece) = {
            let mut conversation = self.lock_conversation();
            let parent = match conversation.current() {
                Some(last) => match self.backend.parent_link() {
                    ParentLink::LastMessageId => last.id.clone(),
                    ParentLink::LastMessageParent => last.parent_id.clone(),
                },
                None => Uuid::new_v4().to_string(),
            };
            let full = Message::new(role.clone(), state.full_text.clone())
                .with_id(state.current_id.clone())
                .with_parent(parent.clone());
            conversation.update_current_message(full.clone());
            let piece = Message::new(role, fragment)
                .with_id(state.current_id.clone())
                .with_parent(parent);
            (full, piece)
        };
        state.last = full.clone();
        on_delta(&piece, &full);
    }
}

/// The prompt-only surface of the completions endpoint: no conversation, no
/// instruction wrapper, just text in and streamed text out.
impl CompletionClient<InstructBackend> {
    /// Stream a completion for a bare prompt. `on_delta` fires once per
    /// scrubbed fragment with the fragment and the text-so-far; the full
    /// text is returned at the end.
    pub async fn prompt_stream<F>(&self, prompt: &str, mut on_delta: F) -> Result<String>
    where
        F: FnMut(&str, &str),
    {
        let _busy = BusyGuard::acquire(&self.busy)?;

        let endpoint = self.backend.endpoint();
        let body = self.backend.build_prompt_request(prompt);
        let response = self.send_with_retry(&endpoint, &body).await?;

        let mut decoder = StreamDecoder::new(Framing::Delta);
        let mut full = String::new();

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for event in decoder.feed(&chunk) {
                self.apply_prompt_event(event, &mut full, &mut on_delta);
            }
            if decoder.is_done() {
                break;
            }
        }
        for event in decoder.finish() {
            self.apply_prompt_event(event, &mut full, &mut on_delta);
        }
        Ok(full)
    }

    /// [`prompt_stream`](CompletionClient::prompt_stream) without a callback.
    pub async fn prompt(&self, text: &str) -> Result<String> {
        self.prompt_stream(text, |_, _| {}).await
    }

    fn apply_prompt_event<F>(&self, event: DeltaEvent, full: &mut String, on_delta: &mut F)
    where
        F: FnMut(&str, &str),
    {
        if event.is_final || event.fragment.is_empty() {
            return;
        }
        let fragment = self.backend.scrub_prompt_fragment(&event.fragment);
        if fragment.is_empty() {
            return;
        }
        full.push_str(&fragment);
        on_delta(&fragment, full);
    }
}

/// Reply-so-far bookkeeping for one stream.
struct StreamState {
    /// Id carried by every replacement; swapped for the server's id when
    /// the stream names one.
    current_id: String,
    role: Option<Role>,
    full_text: String,
    /// Whether any fragment has been through the scrubber yet.
    scrubbed_any: bool,
    /// The reply as last written into the conversation.
    last: Message,
}

impl StreamState {
    fn new(current_id: String, seed: Message) -> Self {
        Self {
            current_id,
            role: None,
            full_text: String::new(),
            scrubbed_any: false,
            last: seed,
        }
    }
}

/// Holds the busy flag for the duration of an exchange; clearing lives in
/// `Drop` so cancellation cannot leave the client stuck busy.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Busy);
        }
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Sort one HTTP response into success, retryable, or fatal.
///
/// 429 and every 5xx are transient. 401 bodies go through the credential
/// classifier. Anything else non-2xx is fatal and unknown.
async fn classify_response(response: Response, model: &str) -> Attempt<Response> {
    let status = response.status();
    if status.is_success() {
        return Attempt::Success(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Attempt::Retry {
            status: status.as_u16(),
            retry_after,
        };
    }
    let raw = response.json::<Value>().await.ok();
    if status == StatusCode::UNAUTHORIZED {
        return Attempt::Fatal(ErrorRecord::classify_unauthorized(raw, model));
    }
    Attempt::Fatal(ErrorRecord::unknown(
        "Unknown error",
        "",
        status.as_u16(),
        raw,
    ))
}
