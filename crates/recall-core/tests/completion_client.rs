//! OpenAI-compatible client against a mock HTTP server.

use std::time::Duration;

use recall_core::{CompletionConfig, CompletionError, CompletionService, OpenAiClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OpenAiClient {
    let config = CompletionConfig::new("sk-test-key")
        .with_endpoint(format!("{}/v1/chat/completions", server.uri()))
        .with_model("gpt-4o-mini")
        .with_http_timeout(Duration::from_millis(500));
    OpenAiClient::new(config).unwrap()
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn test_returns_first_choice_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [{ "role": "user", "content": "describe me" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("{\"a\":1}")))
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server).complete("describe me").await.unwrap();
    assert_eq!(text, "{\"a\":1}");
}

#[tokio::test]
async fn test_error_code_on_success_status_is_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [],
            "error": {
                "code": "model_not_found",
                "message": "The model does not exist",
                "type": "invalid_request_error",
                "param": null
            }
        })))
        .mount(&server)
        .await;

    match client_for(&server).complete("hi").await {
        Err(CompletionError::Service { code, message }) => {
            assert_eq!(code, "model_not_found");
            assert_eq!(message, "The model does not exist");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_error_body_on_failure_status_is_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "code": "rate_limit_exceeded", "message": "slow down", "type": "requests" }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).complete("hi").await.unwrap_err();
    assert!(matches!(err, CompletionError::Service { ref code, .. } if code == "rate_limit_exceeded"));
}

#[tokio::test]
async fn test_plain_failure_status_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    match client_for(&server).complete("hi").await {
        Err(CompletionError::Status { status, body }) => {
            assert_eq!(status, 502);
            assert_eq!(body, "Bad Gateway");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_choices_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = client_for(&server).complete("hi").await.unwrap_err();
    assert!(matches!(err, CompletionError::EmptyChoices));
}

#[tokio::test]
async fn test_non_json_success_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).complete("hi").await.unwrap_err();
    assert!(matches!(err, CompletionError::Decode(_)));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client_for(&server).complete("hi").await.unwrap_err();
    assert!(matches!(err, CompletionError::Timeout));
}
