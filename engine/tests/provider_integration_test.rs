//! Integration tests for the completion providers against a mock HTTP server

use std::sync::Arc;
use std::time::Duration;

use chorus_engine::config::OpenAIConfig;
use chorus_engine::llm::ollama::OllamaProvider;
use chorus_engine::llm::openai::OpenAIProvider;
use chorus_engine::llm::{LLMError, LLMProvider, Message, TimedProvider};
use chorus_engine::secrets::{SecretCache, SecretManager};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn openai(server: &MockServer) -> OpenAIProvider {
    std::env::set_var("CHORUS_PROVIDER_TEST_OPENAI_KEY", "sk-test-key");
    let cache = SecretCache::new(Arc::new(SecretManager::new("chorus-provider-test")));
    let config = OpenAIConfig {
        base_url: server.uri(),
        api_key_secret: "provider_test_openai_key".to_string(),
        ..OpenAIConfig::default()
    };
    OpenAIProvider::new(config, Arc::new(cache))
}

fn messages() -> Vec<Message> {
    vec![Message::system("You are v3s."), Message::user("[]")]
}

#[tokio::test]
async fn test_openai_returns_message_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "response_format": { "type": "json_object" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "{\"response\": \"hey\", \"picked_message\": \"1\"}"
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let content = openai(&server).generate(&messages()).await.unwrap();
    assert_eq!(content, r#"{"response": "hey", "picked_message": "1"}"#);
}

#[tokio::test]
async fn test_openai_model_override_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "model": "gpt-4o" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "{}" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = openai(&server).with_model("gpt-4o");
    assert_eq!(provider.model(), "gpt-4o");
    provider.generate(&messages()).await.unwrap();
}

#[tokio::test]
async fn test_openai_maps_error_statuses() {
    for (status, expected) in [(401u16, "auth"), (429, "rate"), (500, "invalid")] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = openai(&server).generate(&messages()).await.unwrap_err();
        match (expected, err) {
            ("auth", LLMError::AuthenticationFailed(_)) => {}
            ("rate", LLMError::RateLimitExceeded) => {}
            ("invalid", LLMError::InvalidRequest(msg)) => assert!(msg.contains("500")),
            (_, other) => panic!("status {} mapped to {:?}", status, other),
        }
    }
}

#[tokio::test]
async fn test_openai_without_key_fails_authentication() {
    let server = MockServer::start().await;
    let cache = SecretCache::new(Arc::new(SecretManager::new("chorus-provider-test")));
    let config = OpenAIConfig {
        base_url: server.uri(),
        api_key_secret: "provider_test_missing_key_zz".to_string(),
        ..OpenAIConfig::default()
    };
    let provider = OpenAIProvider::new(config, Arc::new(cache));

    let err = provider.generate(&messages()).await.unwrap_err();
    assert!(matches!(err, LLMError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn test_openai_empty_choices_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = openai(&server).generate(&messages()).await.unwrap_err();
    assert!(matches!(err, LLMError::ParseError(_)));
}

#[tokio::test]
async fn test_ollama_requests_json_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.1:8b",
            "format": "json",
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "{\"response\": \"*SILENCE*\"}" },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "llama3.1:8b");
    assert_eq!(provider.name(), "ollama");
    assert!(provider.is_local());

    let content = provider.generate(&messages()).await.unwrap();
    assert_eq!(content, r#"{"response": "*SILENCE*"}"#);
}

#[tokio::test]
async fn test_ollama_error_status_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "missing");
    match provider.generate(&messages()).await.unwrap_err() {
        LLMError::ProviderUnavailable(msg) => assert!(msg.contains("model not found")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_ollama_connection_refused() {
    // Port 9 (discard) is closed on test hosts
    let provider = OllamaProvider::new("http://127.0.0.1:9", "llama3.1:8b");

    match provider.generate(&messages()).await.unwrap_err() {
        LLMError::ProviderUnavailable(msg) => assert!(msg.contains("Cannot connect to Ollama")),
        LLMError::NetworkError(_) => {}
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "message": { "content": "{}" } }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let inner: Arc<dyn LLMProvider> = Arc::new(OllamaProvider::new(server.uri(), "slow"));
    let provider = TimedProvider::new(inner, Duration::from_millis(100));

    let err = provider.generate(&messages()).await.unwrap_err();
    assert!(matches!(err, LLMError::Timeout));
}
