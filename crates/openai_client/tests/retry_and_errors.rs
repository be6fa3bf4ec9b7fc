//! Integration tests for retry behavior and API error classification

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use openai_client::{
    ChatBackend, ChatModel, ChatOptions, CompletionClient, Error, ErrorKind, RetryPolicy,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_client(server_uri: &str) -> CompletionClient<ChatBackend> {
    let options = ChatOptions::new("sk-test", ChatModel::Gpt35Turbo).with_base_url(server_uri);
    CompletionClient::new(ChatBackend::new(options))
}

fn success_body() -> String {
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n".to_string()
}

/// Test that rate-limited requests are retried until the server recovers,
/// honoring the server's Retry-After hint.
#[tokio::test]
async fn test_rate_limited_request_is_retried_until_success() {
    let mock_server = MockServer::start().await;
    let request_count = Arc::new(AtomicUsize::new(0));
    let counter = request_count.clone();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                ResponseTemplate::new(429).insert_header("Retry-After", "0")
            } else {
                ResponseTemplate::new(200).set_body_raw(success_body(), "text/event-stream")
            }
        })
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = chat_client(&mock_server.uri());
    let reply = client.ask("Hello").await.expect("exchange after retries");

    assert_eq!(reply.content, "Hi");
    assert_eq!(request_count.load(Ordering::SeqCst), 3);
}

/// Test that a server that never recovers exhausts the attempt budget and
/// surfaces a rate-limit record.
#[tokio::test]
async fn test_persistent_rate_limit_exhausts_attempts() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client =
        chat_client(&mock_server.uri()).with_retry_policy(RetryPolicy::new(3));
    let result = client.ask("Hello").await;

    match result {
        Err(Error::Api(record)) => {
            assert_eq!(record.kind, ErrorKind::RateLimitExceeded);
            assert_eq!(record.status, 429);
        }
        other => panic!("expected rate limit error, got {other:?}"),
    }
}

/// Test that a 401 with a known error code is classified and never retried,
/// leaving no placeholder reply in the conversation.
#[tokio::test]
async fn test_unauthorized_is_classified_and_fatal() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {
                "code": "invalid_api_key",
                "message": "Incorrect API key provided: sk-test.",
                "type": "invalid_request_error"
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = chat_client(&mock_server.uri());
    let result = client.ask("Hello").await;

    match result {
        Err(Error::Api(record)) => {
            assert_eq!(record.kind, ErrorKind::InvalidCredential);
            assert_eq!(record.code, "invalid_api_key");
            assert_eq!(record.status, 401);
            assert!(record.raw.is_some());
        }
        other => panic!("expected credential error, got {other:?}"),
    }

    // The user message stays; no assistant placeholder was seeded.
    let conversation = client.conversation();
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.current().expect("current").content, "Hello");
    assert!(!client.is_busy());
}

/// Test that other client errors come back as an unclassified record with
/// the response status attached.
#[tokio::test]
async fn test_unexpected_status_is_fatal_and_unclassified() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = chat_client(&mock_server.uri());
    let result = client.ask("Hello").await;

    match result {
        Err(Error::Api(record)) => {
            assert_eq!(record.kind, ErrorKind::Unknown);
            assert_eq!(record.status, 404);
        }
        other => panic!("expected api error, got {other:?}"),
    }
}
