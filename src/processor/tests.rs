//! 处理器模块测试

use super::*;
use crate::backends::BackendError;
use crate::models::backend::BackendEnvelope;
use crate::models::openai::EmbeddingVector;
use crate::testing::{CountingTokenSource, ScriptedBackend};
use serde_json::json;
use std::sync::atomic::Ordering;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_request(value: serde_json::Value) -> ChatCompletionRequest {
    serde_json::from_value(value).unwrap()
}

fn hello() -> ChatCompletionRequest {
    chat_request(json!({
        "model": "m",
        "messages": [{"role": "user", "content": "hi"}]
    }))
}

fn scripted(config: &GatewayConfig) -> (RequestProcessor, Arc<ScriptedBackend>, Arc<CountingTokenSource>) {
    let backend = Arc::new(ScriptedBackend::new());
    let source = Arc::new(CountingTokenSource::with_delay(20));
    let tokens = Arc::new(TokenManager::new(source.clone()));
    let processor = RequestProcessor::new(backend.clone(), tokens, config, None);
    (processor, backend, source)
}

fn http_config(server: &MockServer) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.backend.token_url = format!("{}/token", server.uri());
    config.backend.chat_url = format!("{}/chat", server.uri());
    config.backend.chat_stream_url = Some(format!("{}/chat/stream", server.uri()));
    config.backend.embedding_url = format!("{}/embed", server.uri());
    config.backend.auth_code = "secret-code".into();
    config.timeouts.request_timeout_ms = 2_000;
    config.translation.usage_estimation = false;
    config
}

fn token_body(token: &str) -> serde_json::Value {
    json!({"data": {"access_token": token, "expires_in": 1800}})
}

async fn mount_tokens(server: &MockServer, tokens: &[&str]) {
    for token in tokens {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(token)))
            .up_to_n_times(1)
            .expect(1)
            .mount(server)
            .await;
    }
}

// ========== 端到端（HTTP 后端） ==========

#[tokio::test]
async fn test_backend_401_refreshes_token_and_succeeds() {
    let server = MockServer::start().await;
    mount_tokens(&server, &["tok-1", "tok-2"]).await;

    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(header("Authorization", "tok-1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(header("Authorization", "tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0,
            "data": {"content": {"content": "Hello!"}, "finish_reason": "stop"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let processor = RequestProcessor::from_config(&http_config(&server)).unwrap();
    let response = processor.chat_completion(hello()).await.unwrap();

    assert_eq!(response.model, "m");
    assert_eq!(response.choices[0].message.content.as_deref(), Some("Hello!"));
    assert_eq!(response.choices[0].finish_reason, "stop");
}

#[tokio::test]
async fn test_backend_401_twice_surfaces_error() {
    let server = MockServer::start().await;
    mount_tokens(&server, &["tok-1", "tok-2"]).await;

    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
        .expect(2)
        .mount(&server)
        .await;

    let processor = RequestProcessor::from_config(&http_config(&server)).unwrap();
    let err = processor.chat_completion(hello()).await.unwrap_err();

    assert!(matches!(err, GatewayError::AuthExpiredUpstream(_)));
    let json = err.to_json();
    assert_eq!(json["error"]["upstream"]["status"], 401);
    assert_eq!(json["error"]["upstream"]["body"], "nope");
}

#[tokio::test]
async fn test_token_endpoint_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let processor = RequestProcessor::from_config(&http_config(&server)).unwrap();
    let err = processor.chat_completion(hello()).await.unwrap_err();

    assert!(matches!(err, GatewayError::TokenAcquisitionFailed(_)));
    assert_eq!(err.status_code(), 502);
    assert!(!processor.tokens().has_cached_token().await);
}

#[tokio::test]
async fn test_extreme_token_payload_is_token_failure_without_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"access_token": "LIVE-SECRET-TOKEN", "expires_in": i64::MAX}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let processor = RequestProcessor::from_config(&http_config(&server)).unwrap();
    let err = processor.chat_completion(hello()).await.unwrap_err();

    assert!(matches!(err, GatewayError::TokenAcquisitionFailed(_)));
    assert!(!err.to_json().to_string().contains("LIVE-SECRET-TOKEN"));
    assert!(!processor.tokens().has_cached_token().await);
}

#[tokio::test]
async fn test_stream_end_to_end() {
    let server = MockServer::start().await;
    mount_tokens(&server, &["tok-1"]).await;

    let body = concat!(
        "data: {\"data\":{\"content\":{\"content\":\"Hel\"}}}\n\n",
        "data: {\"data\":{\"content\":{\"content\":\"lo!\"}}}\n\n",
        "data: {\"data\":{\"finish_reason\":\"stop\"}}\n\n",
        "data: [DONE]\n\n"
    );
    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let processor = RequestProcessor::from_config(&http_config(&server)).unwrap();
    let mut request = hello();
    request.stream = true;
    let frames: Vec<String> = processor
        .chat_completion_stream(request)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(frames.len(), 4);
    assert!(frames[0].contains("\"role\":\"assistant\""));
    assert!(frames[1].contains("\"content\":\"lo!\""));
    assert!(frames[2].contains("\"finish_reason\":\"stop\""));
    assert_eq!(frames[3], "data: [DONE]\n\n");
}

#[tokio::test]
async fn test_embeddings_end_to_end() {
    let server = MockServer::start().await;
    mount_tokens(&server, &["tok-1"]).await;

    Mock::given(method("POST"))
        .and(path("/embed"))
        .and(header("Authorization", "tok-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"content": [0.1, 0.2]}})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let processor = RequestProcessor::from_config(&http_config(&server)).unwrap();
    let request: EmbeddingRequest =
        serde_json::from_value(json!({"input": ["a", "b"], "model": "emb"})).unwrap();
    let response = processor.embeddings(request).await.unwrap();

    assert_eq!(response.object, "list");
    assert_eq!(response.model, "emb");
    assert_eq!(response.data.len(), 2);
    assert_eq!(response.data[1].index, 1);
}

// ========== 脚本化后端 ==========

#[tokio::test]
async fn test_concurrent_requests_share_one_token_acquisition() {
    let (processor, backend, source) = scripted(&GatewayConfig::default());
    for _ in 0..8 {
        backend.push_chat(Ok(BackendEnvelope::text_fragment("ok")));
    }
    let processor = Arc::new(processor);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let processor = processor.clone();
            tokio::spawn(async move { processor.chat_completion(hello()).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(source.calls(), 1);
    assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_unsupported_feature_never_reaches_backend() {
    let (processor, backend, source) = scripted(&GatewayConfig::default());
    let request = chat_request(json!({
        "model": "m",
        "messages": [{"role": "user", "content": "hi"}],
        "n": 3
    }));

    let err = processor.chat_completion(request).await.unwrap_err();
    assert!(matches!(err, GatewayError::UnsupportedFeature(_)));
    assert_eq!(err.status_code(), 400);
    assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_non_stream_forces_stream_flag_off() {
    let (processor, backend, _source) = scripted(&GatewayConfig::default());
    backend.push_chat(Ok(BackendEnvelope::text_fragment("x")));

    processor.chat_completion(hello()).await.unwrap();
    let sent = backend.chat_requests.lock().unwrap()[0].clone();
    assert!(!sent.stream);
    assert_eq!(sent.temperature, 0.8);
}

#[tokio::test]
async fn test_stream_open_failure_is_returned_before_streaming() {
    let (processor, backend, _source) = scripted(&GatewayConfig::default());
    backend.push_stream(Err(BackendError::from_status(429, "slow down")));

    let mut request = hello();
    request.stream = true;
    let err = match processor.chat_completion_stream(request).await {
        Ok(_) => panic!("expected the stream to fail before opening"),
        Err(e) => e,
    };
    assert!(matches!(err, GatewayError::RateLimited(_)));
    assert_eq!(backend.stream_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_embeddings_keep_input_order() {
    let mut config = GatewayConfig::default();
    config.embeddings.max_concurrency = 2;
    let (processor, backend, _source) = scripted(&config);

    let request: EmbeddingRequest =
        serde_json::from_value(json!({"input": ["a", "bbb", "cc", "dddd"]})).unwrap();
    let response = processor.embeddings(request).await.unwrap();

    let firsts: Vec<f32> = response
        .data
        .iter()
        .map(|d| match &d.embedding {
            EmbeddingVector::Float(v) => v[0],
            EmbeddingVector::Base64(_) => panic!("expected float"),
        })
        .collect();
    assert_eq!(firsts, vec![1.0, 3.0, 2.0, 4.0]);
    assert_eq!(backend.embed_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_embeddings_failure_fails_whole_request() {
    let (processor, backend, _source) = scripted(&GatewayConfig::default());
    backend.push_embed_failure(BackendError::from_status(429, "busy"));

    let request: EmbeddingRequest =
        serde_json::from_value(json!({"input": ["a", "b"]})).unwrap();
    let err = processor.embeddings(request).await.unwrap_err();
    assert!(matches!(err, GatewayError::RateLimited(_)));
}

#[tokio::test]
async fn test_embedding_auth_failure_replayed() {
    let (processor, backend, source) = scripted(&GatewayConfig::default());
    backend.push_embed_failure(BackendError::from_status(401, ""));

    let request: EmbeddingRequest = serde_json::from_value(json!({"input": "x"})).unwrap();
    let response = processor.embeddings(request).await.unwrap();

    assert_eq!(response.data.len(), 1);
    assert_eq!(backend.tokens(), vec!["token-1", "token-2"]);
    assert_eq!(source.calls(), 2);
}
