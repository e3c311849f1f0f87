use std::sync::Arc;
use std::time::Duration;

use flashforge::gateway::{
    Attribution, ChatGateway, ChatProvider, ChatRequest, FinishReason, GroqAdapter, Message,
    ProviderError, ProviderGateway,
};
use flashforge::ledger::InMemoryUsageLedger;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> GroqAdapter {
    GroqAdapter::with_config("gsk-test", server.uri(), Duration::from_secs(5)).unwrap()
}

fn request() -> ChatRequest {
    ChatRequest::new(
        "llama-3.1-8b-instant",
        vec![Message::user("hi")],
        Attribution::new("intent"),
    )
    .json()
}

#[tokio::test]
async fn groq_parses_content_and_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer gsk-test"))
        .and(body_partial_json(json!({
            "model": "llama-3.1-8b-instant",
            "response_format": { "type": "json_object" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "content": "{\"topic\": \"Python\"}" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = adapter(&server).chat(&request()).await.unwrap();
    assert_eq!(resp.content, "{\"topic\": \"Python\"}");
    assert_eq!(resp.finish_reason, FinishReason::Stop);
    let usage = resp.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 12);
    assert_eq!(usage.completion_tokens, 8);
    assert_eq!(usage.total_tokens, 20);
}

#[tokio::test]
async fn groq_tolerates_missing_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "{}" }, "finish_reason": "stop" }]
        })))
        .mount(&server)
        .await;

    let ledger = Arc::new(InMemoryUsageLedger::new());
    let gateway = ProviderGateway::new(Arc::new(adapter(&server)), ledger.clone());
    let resp = ChatGateway::chat(&gateway, request()).await.unwrap();

    assert!(resp.usage.is_none());
    assert!(ledger.events().is_empty());
}

#[tokio::test]
async fn groq_maps_429_to_rate_limited_with_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "7")
                .insert_header("x-request-id", "req_123")
                .set_body_json(json!({
                    "error": { "message": "Rate limit reached", "code": "rate_limit_exceeded" }
                })),
        )
        .mount(&server)
        .await;

    let err = adapter(&server).chat(&request()).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.code(), "rate_limited");
    assert_eq!(err.request_id(), Some("req_123"));
    match err {
        ProviderError::RateLimited { retry_after, .. } => {
            assert_eq!(retry_after, Duration::from_secs(7));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn groq_429_without_header_defaults_to_two_seconds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    match adapter(&server).chat(&request()).await.unwrap_err() {
        ProviderError::RateLimited { retry_after, .. } => {
            assert_eq!(retry_after, Duration::from_secs(2));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn groq_server_errors_are_retryable_client_errors_are_not() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "model not found" }
        })))
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let first = adapter.chat(&request()).await.unwrap_err();
    assert!(matches!(first, ProviderError::Provider { retryable: true, .. }));
    assert!(!first.is_rate_limited());

    let second = adapter.chat(&request()).await.unwrap_err();
    assert!(matches!(second, ProviderError::Provider { retryable: false, .. }));
    assert!(second.to_string().contains("model not found"));
}

#[tokio::test]
async fn gateway_does_not_retry_and_records_nothing_on_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let ledger = Arc::new(InMemoryUsageLedger::new());
    let gateway = ProviderGateway::new(Arc::new(adapter(&server)), ledger.clone());
    assert!(gateway.chat(request()).await.is_err());
    assert!(ledger.events().is_empty());
}

#[tokio::test]
async fn groq_lists_models_sorted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "id": "llama-3.3-70b-versatile", "object": "model" },
                { "id": "llama-3.1-8b-instant", "object": "model" }
            ]
        })))
        .mount(&server)
        .await;

    let models = adapter(&server).list_models().await.unwrap();
    assert_eq!(models, vec!["llama-3.1-8b-instant", "llama-3.3-70b-versatile"]);
}
