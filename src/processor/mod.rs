//! 请求处理器
//!
//! 串联一次请求的完整流程：
//!
//! ```text
//! OpenAI 请求 ──> RequestTranslator ──> RetryCoordinator(TokenManager) ──> ChatBackend
//!                                                  │
//!                     非流式: ResponseTranslator <──┤
//!                     流式:   StreamRelay <─────────┘
//! ```

pub mod error;

pub use error::GatewayError;

use crate::backends::{ChatBackend, HttpBackend, HttpClientFactory};
use crate::config::{GatewayConfig, StreamMode};
use crate::models::backend::{BackendEmbeddingEnvelope, BackendEmbeddingRequest};
use crate::models::catalog::ModelCatalog;
use crate::models::openai::{
    ChatCompletionRequest, ChatCompletionResponse, EmbeddingRequest, EmbeddingResponse,
};
use crate::providers::{AuthCodeTokenSource, TokenManager};
use crate::resilience::RetryCoordinator;
use crate::stream::{SseStream, StreamRelay};
use crate::telemetry::TokenEstimator;
use crate::translator::{
    ChatRequestTranslator, EmbeddingRequestTranslator, RequestTranslator, ResponseTranslator,
};
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;

pub struct RequestProcessor {
    backend: Arc<dyn ChatBackend>,
    retry: RetryCoordinator,
    chat_translator: ChatRequestTranslator,
    embedding_translator: EmbeddingRequestTranslator,
    responses: ResponseTranslator,
    catalog: ModelCatalog,
    stream_mode: StreamMode,
    simulated_chunks: usize,
    embedding_concurrency: usize,
}

impl RequestProcessor {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        tokens: Arc<TokenManager>,
        config: &GatewayConfig,
        estimator: Option<Arc<TokenEstimator>>,
    ) -> Self {
        Self {
            backend,
            retry: RetryCoordinator::new(tokens),
            chat_translator: ChatRequestTranslator::new(config.translation.clone()),
            embedding_translator: EmbeddingRequestTranslator::new(config.translation.clone()),
            responses: ResponseTranslator::new(estimator, config.embeddings.dimension_policy),
            catalog: ModelCatalog::new(&config.models),
            stream_mode: config.backend.stream_mode,
            simulated_chunks: config.backend.simulated_chunks,
            embedding_concurrency: config.embeddings.max_concurrency.max(1),
        }
    }

    /// 按配置组装 HTTP 后端、令牌来源与令牌管理器
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let client = HttpClientFactory::new()
            .with_connect_timeout(config.timeouts.connect_timeout())
            .with_verify_tls(config.backend.verify_tls)
            .build()?;

        let source = AuthCodeTokenSource::new(
            client.clone(),
            config.backend.token_url.clone(),
            config.backend.auth_code.clone(),
        )
        .with_default_ttl(chrono::Duration::seconds(config.token.default_ttl_secs))
        .with_timeout(config.timeouts.token_timeout());

        let tokens = Arc::new(
            TokenManager::new(Arc::new(source))
                .with_margin(chrono::Duration::seconds(config.token.refresh_margin_secs))
                .with_alarm_threshold(config.token.alarm_after_failures),
        );

        let backend = Arc::new(HttpBackend::new(
            client,
            &config.backend,
            config.timeouts.clone(),
        ));

        let estimator = if config.translation.usage_estimation {
            match TokenEstimator::new() {
                Ok(estimator) => Some(Arc::new(estimator)),
                Err(e) => {
                    tracing::warn!("[PROCESSOR] {}，用量将返回 0", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(backend, tokens, config, estimator))
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        self.retry.tokens()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// 非流式聊天
    pub async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, GatewayError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let model = request.model.clone();
        let start = Instant::now();

        let result = self.run_chat(request, &model).await;
        match &result {
            Ok(_) => tracing::info!(
                request_id = %request_id,
                model = %model,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "[PROCESSOR] chat 完成"
            ),
            Err(e) => e.log_with_context(&request_id, &model),
        }
        result
    }

    async fn run_chat(
        &self,
        request: ChatCompletionRequest,
        model: &str,
    ) -> Result<ChatCompletionResponse, GatewayError> {
        let mut backend_request = self.chat_translator.translate_request(request)?;
        backend_request.stream = false;

        let backend = &self.backend;
        let envelope = self
            .retry
            .execute(|token| {
                let request = &backend_request;
                async move { backend.chat(&token, request).await }
            })
            .await?;

        Ok(self
            .responses
            .chat_response(&envelope, &backend_request, model)?)
    }

    /// 流式聊天
    ///
    /// 返回时后端流已建立，之后的错误以流内错误事件的形式出现。
    pub async fn chat_completion_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<SseStream, GatewayError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let model = request.model.clone();

        let result = async {
            let mut backend_request = self.chat_translator.translate_request(request)?;
            backend_request.stream = true;

            let mut relay = StreamRelay::new(
                self.backend.clone(),
                self.retry.clone(),
                self.responses.clone(),
                model.clone(),
            )
            .with_mode(self.stream_mode, self.simulated_chunks);
            relay.open(&backend_request).await?;

            tracing::info!(
                request_id = %request_id,
                model = %model,
                response_id = %relay.response_id(),
                "[PROCESSOR] 流式响应开始"
            );
            Ok::<_, GatewayError>(relay.into_sse_stream())
        }
        .await;

        if let Err(e) = &result {
            e.log_with_context(&request_id, &model);
        }
        result
    }

    /// 向量
    ///
    /// 每条输入一次后端调用，并发数受限，结果按输入顺序返回；任一失败则整体失败。
    pub async fn embeddings(
        &self,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, GatewayError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let model = request.model.clone();
        let format = request.encoding_format.unwrap_or_default();

        let result = async {
            let requests = self.embedding_translator.translate_request(request)?;
            tracing::debug!(
                request_id = %request_id,
                inputs = requests.len(),
                "[PROCESSOR] 向量请求"
            );

            let calls: Vec<_> = requests.iter().map(|r| self.embed_one(r)).collect();
            let results: Vec<BackendEmbeddingEnvelope> =
                futures::stream::iter(calls)
                    .buffered(self.embedding_concurrency)
                    .try_collect()
                    .await?;

            let response = self
                .responses
                .embedding_response(results, &requests, format, &model)?;
            Ok::<_, GatewayError>(response)
        }
        .await;

        if let Err(e) = &result {
            e.log_with_context(&request_id, &model);
        }
        result
    }

    async fn embed_one(
        &self,
        request: &BackendEmbeddingRequest,
    ) -> Result<BackendEmbeddingEnvelope, GatewayError> {
        let backend = &self.backend;
        self.retry
            .execute(|token| async move { backend.embed(&token, request).await })
            .await
    }
}

#[cfg(test)]
mod tests;
