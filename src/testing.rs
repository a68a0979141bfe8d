//! 测试辅助：计数令牌来源与脚本化后端

use crate::backends::{BackendChunkStream, BackendError, BackendResult, ChatBackend};
use crate::models::backend::{
    BackendChatRequest, BackendEmbeddingData, BackendEmbeddingEnvelope, BackendEmbeddingRequest,
    BackendEnvelope,
};
use crate::providers::{AccessToken, TokenError, TokenSource};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// 每次换取生成 `token-N`
pub struct CountingTokenSource {
    calls: AtomicU32,
    delay_ms: u64,
}

impl CountingTokenSource {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay_ms: 0,
        }
    }

    pub fn with_delay(delay_ms: u64) -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay_ms,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for CountingTokenSource {
    async fn acquire(&self) -> Result<AccessToken, TokenError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        Ok(AccessToken::new(
            format!("token-{}", n),
            chrono::Duration::minutes(30),
        ))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// 按脚本依次返回结果的后端
#[derive(Default)]
pub struct ScriptedBackend {
    chat: Mutex<VecDeque<BackendResult<BackendEnvelope>>>,
    streams: Mutex<VecDeque<BackendResult<BackendChunkStream>>>,
    embed_failures: Mutex<VecDeque<BackendError>>,
    pub chat_calls: AtomicU32,
    pub stream_calls: AtomicU32,
    pub embed_calls: AtomicU32,
    pub seen_tokens: Mutex<Vec<String>>,
    pub chat_requests: Mutex<Vec<BackendChatRequest>>,
    pub embed_requests: Mutex<Vec<BackendEmbeddingRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chat(&self, result: BackendResult<BackendEnvelope>) {
        self.chat.lock().unwrap().push_back(result);
    }

    pub fn push_stream(&self, result: BackendResult<BackendChunkStream>) {
        self.streams.lock().unwrap().push_back(result);
    }

    /// 以给定数据块构造一个流
    pub fn push_stream_items(&self, items: Vec<BackendResult<BackendEnvelope>>) {
        self.push_stream(Ok(Box::pin(futures::stream::iter(items))));
    }

    pub fn push_embed_failure(&self, error: BackendError) {
        self.embed_failures.lock().unwrap().push_back(error);
    }

    pub fn tokens(&self) -> Vec<String> {
        self.seen_tokens.lock().unwrap().clone()
    }

    fn record_token(&self, token: &AccessToken) {
        self.seen_tokens
            .lock()
            .unwrap()
            .push(token.secret().to_string());
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(
        &self,
        token: &AccessToken,
        request: &BackendChatRequest,
    ) -> BackendResult<BackendEnvelope> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        self.chat_requests.lock().unwrap().push(request.clone());
        self.chat
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::malformed("no scripted chat response")))
    }

    async fn chat_stream(
        &self,
        token: &AccessToken,
        request: &BackendChatRequest,
    ) -> BackendResult<BackendChunkStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        self.chat_requests.lock().unwrap().push(request.clone());
        self.streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::malformed("no scripted stream")))
    }

    /// 返回 `[文本长度, 1.0, 2.0, 3.0]`，便于校验顺序
    async fn embed(
        &self,
        token: &AccessToken,
        request: &BackendEmbeddingRequest,
    ) -> BackendResult<BackendEmbeddingEnvelope> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        self.embed_requests.lock().unwrap().push(request.clone());
        if let Some(err) = self.embed_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(BackendEmbeddingEnvelope {
            data: Some(BackendEmbeddingData {
                content: serde_json::json!([request.text.len() as f32, 1.0, 2.0, 3.0]),
            }),
            ..Default::default()
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
