//! Integration tests for full streamed exchanges against a mock server

use std::sync::Arc;
use std::time::Duration;

use openai_client::{
    ChatBackend, ChatModel, ChatOptions, CompletionClient, Error, InstructBackend, InstructModel,
    InstructOptions, Role, WebChatBackend, WebChatModel, WebChatOptions,
};
use serde_json::Value;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Frame payloads joined into a `data:`-framed body, terminated by the
/// sentinel.
fn sse_body(frames: &[&str]) -> String {
    let mut body = String::new();
    for frame in frames {
        body.push_str("data: ");
        body.push_str(frame);
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn chat_client(server_uri: &str) -> CompletionClient<ChatBackend> {
    let options = ChatOptions::new("sk-test", ChatModel::Gpt35Turbo).with_base_url(server_uri);
    CompletionClient::new(ChatBackend::new(options))
}

fn instruct_client(server_uri: &str) -> CompletionClient<InstructBackend> {
    let options = InstructOptions::new("sk-test", InstructModel::Davinci).with_base_url(server_uri);
    CompletionClient::new(InstructBackend::new(options))
}

fn web_client(server_uri: &str) -> CompletionClient<WebChatBackend> {
    let options =
        WebChatOptions::new("web-token", WebChatModel::Default).with_api_prefix(format!("{server_uri}/"));
    CompletionClient::new(WebChatBackend::new(options))
}

/// Test that a chat exchange streams fragments through the callback and
/// folds the reply into the conversation.
#[tokio::test]
async fn test_chat_exchange_streams_fragments_into_the_conversation() {
    let mock_server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
        r#"{"choices":[{"delta":{"content":"Hi"}}]}"#,
        r#"{"choices":[{"delta":{"content":" there"}}]}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = chat_client(&mock_server.uri());
    let mut pieces: Vec<String> = Vec::new();
    let mut fulls: Vec<String> = Vec::new();
    let reply = client
        .exchange(Some("Hello"), |piece, full| {
            pieces.push(piece.content.clone());
            fulls.push(full.content.clone());
        })
        .await
        .expect("exchange");

    assert_eq!(reply.content, "Hi there");
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(pieces, vec!["Hi", " there"]);
    assert_eq!(fulls, vec!["Hi", "Hi there"]);

    let conversation = client.conversation();
    assert_eq!(conversation.len(), 3);
    let messages = conversation.messages();
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].content, "Hello");
    // The user message hangs off the system message; the streamed reply's
    // parent is its own id, which is this dialect's long-standing shape.
    assert_eq!(messages[1].parent_id, messages[0].id);
    assert_eq!(messages[2].parent_id, messages[2].id);
    assert_eq!(conversation.current().expect("current").content, "Hi there");
}

/// Test that the chat request body carries the windowed history and budgets
/// the response against the model ceiling.
#[tokio::test]
async fn test_chat_request_budgets_against_the_ceiling() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[r#"{"choices":[{"delta":{"content":"ok"}}]}"#]),
            "text/event-stream",
        ))
        .mount(&mock_server)
        .await;

    let client = chat_client(&mock_server.uri());
    client.ask("Hello").await.expect("exchange");

    let requests = mock_server.received_requests().await.expect("requests");
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");

    assert_eq!(body["model"], "gpt-3.5-turbo");
    assert_eq!(body["stream"], true);
    assert_eq!(body["temperature"], 0.7);
    let messages = body["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1], serde_json::json!({"role": "user", "content": "Hello"}));

    // The window cost (system message plus one user word, four tokens per
    // word) comes straight off the ceiling.
    let conversation = client.conversation();
    let system_words = conversation.messages()[0].content.split_whitespace().count() as u64;
    assert_eq!(
        body["max_tokens"].as_u64().expect("max_tokens"),
        4097 - system_words * 4 - 4
    );
}

/// Test that a web exchange adopts the server's conversation and message
/// ids and diffs full-replacement frames into fragments.
#[tokio::test]
async fn test_web_exchange_adopts_server_identity() {
    let mock_server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"conversation_id":"c-1","message":{"id":"srv-m1","author":{"role":"assistant"},"content":{"parts":["Hel"]}}}"#,
        r#"{"message":{"id":"srv-m1","author":{"role":"assistant"},"content":{"parts":["Hello"]}}}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/conversation"))
        .and(header("Authorization", "Bearer web-token"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = web_client(&mock_server.uri());
    let mut pieces: Vec<String> = Vec::new();
    let reply = client
        .exchange(Some("hello"), |piece, _| pieces.push(piece.content.clone()))
        .await
        .expect("exchange");

    assert_eq!(pieces, vec!["Hel", "lo"]);
    assert_eq!(reply.content, "Hello");
    assert_eq!(reply.id, "srv-m1");

    let conversation = client.conversation();
    assert_eq!(conversation.id(), "c-1");
    // No system message on this dialect; the reply hangs off the user
    // message that prompted it.
    assert_eq!(conversation.len(), 2);
    assert_eq!(reply.parent_id, conversation.messages()[0].id);

    // The first request has no conversation id; once the server names one
    // it rides along on the next request.
    client.ask("again").await.expect("second exchange");
    let requests = mock_server.received_requests().await.expect("requests");
    let first: Value = serde_json::from_slice(&requests[0].body).expect("json");
    let second: Value = serde_json::from_slice(&requests[1].body).expect("json");
    assert!(first.get("conversation_id").is_none());
    assert_eq!(second["conversation_id"], "c-1");
    assert_eq!(second["action"], "next");
    assert!(second["timezone_offset_min"].is_i64());
}

/// Test that an instruct exchange wraps history into a transcript prompt
/// and scrubs the echoed label off the streamed reply.
#[tokio::test]
async fn test_instruct_exchange_wraps_and_scrubs() {
    let mock_server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"choices":[{"text":"\n\nAssistant: Hello"}]}"#,
        r#"{"choices":[{"text":" there"}]}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = instruct_client(&mock_server.uri());
    let reply = client.ask("hi").await.expect("exchange");

    assert_eq!(reply.content, "Hello there");
    let conversation = client.conversation();
    assert_eq!(conversation.len(), 3);
    assert_eq!(reply.parent_id, conversation.messages()[1].id);

    let requests = mock_server.received_requests().await.expect("requests");
    let body: Value = serde_json::from_slice(&requests[0].body).expect("json");
    let prompt = body["prompt"].as_str().expect("prompt");
    assert!(prompt.starts_with("You take input in the form ROLE: MESSAGE."));
    assert!(prompt.contains("\nUser: hi"));
    assert!(prompt.ends_with("\n\nAssistant:"));
}

/// Test that the bare prompt surface skips the conversation entirely and
/// strips leading newlines from the completion.
#[tokio::test]
async fn test_prompt_stream_returns_bare_completion() {
    let mock_server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"choices":[{"text":"\n\nHello"}]}"#,
        r#"{"choices":[{"text":" world"}]}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = instruct_client(&mock_server.uri());
    let before = client.conversation().len();
    let mut fulls: Vec<String> = Vec::new();
    let text = client
        .prompt_stream("Say hello", |_, full| fulls.push(full.to_string()))
        .await
        .expect("prompt");

    assert_eq!(text, "Hello world");
    assert_eq!(fulls, vec!["Hello", "Hello world"]);
    // Prompt completions never touch the conversation.
    assert_eq!(client.conversation().len(), before);

    let requests = mock_server.received_requests().await.expect("requests");
    let body: Value = serde_json::from_slice(&requests[0].body).expect("json");
    assert_eq!(body["prompt"], "Say hello");
}

/// Test that a second exchange is rejected while one is streaming, without
/// disturbing the conversation.
#[tokio::test]
async fn test_busy_client_rejects_overlapping_exchanges() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(
                    sse_body(&[r#"{"choices":[{"delta":{"content":"Hi"}}]}"#]),
                    "text/event-stream",
                )
                .set_delay(Duration::from_millis(250)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Arc::new(chat_client(&mock_server.uri()));
    let background = {
        let client = client.clone();
        tokio::spawn(async move { client.ask("slow one").await })
    };

    for _ in 0..200 {
        if client.is_busy() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(client.is_busy());

    let overlap = client.ask("overlap").await;
    assert!(matches!(overlap, Err(Error::Busy)));
    let reset = client.reset();
    assert!(matches!(reset, Err(Error::Busy)));

    let first = background.await.expect("join").expect("first exchange");
    assert_eq!(first.content, "Hi");
    assert!(!client.is_busy());
    // The rejected calls left no trace: system, one user, one reply.
    assert_eq!(client.conversation().len(), 3);
}
