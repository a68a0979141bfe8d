//! HTTP 后端
//!
//! 通过 reqwest 调用后端的聊天、流式聊天与向量端点，
//! 并把 HTTP 状态、响应体错误码、超时统一分类为 `BackendError`。

use super::traits::{BackendChunkStream, BackendError, BackendResult, ChatBackend};
use crate::config::BackendConfig;
use crate::logger::sanitize_log_message;
use crate::models::backend::{
    BackendChatRequest, BackendEmbeddingEnvelope, BackendEmbeddingRequest, BackendEnvelope,
};
use crate::providers::AccessToken;
use crate::resilience::{next_with_idle_timeout, with_timeout, TimeoutConfig};
use crate::stream::parsers::{BackendFrame, BackendLineParser, ParserState};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;

pub struct HttpBackend {
    client: Client,
    chat_url: String,
    stream_url: String,
    embedding_url: String,
    auth_header: String,
    auth_prefix: String,
    timeouts: TimeoutConfig,
}

impl HttpBackend {
    pub fn new(client: Client, config: &BackendConfig, timeouts: TimeoutConfig) -> Self {
        Self {
            client,
            chat_url: config.chat_url.clone(),
            stream_url: config.stream_url().to_string(),
            embedding_url: config.embedding_url.clone(),
            auth_header: config.auth_header.clone(),
            auth_prefix: config.auth_prefix.clone(),
            timeouts,
        }
    }

    fn post<T: Serialize + ?Sized>(&self, url: &str, token: &AccessToken, body: &T) -> RequestBuilder {
        self.client
            .post(url)
            .header(
                self.auth_header.as_str(),
                format!("{}{}", self.auth_prefix, token.secret()),
            )
            .json(body)
    }

    /// 发送非流式请求并读取完整响应体
    async fn send_for_body(&self, builder: RequestBuilder) -> BackendResult<String> {
        let resp = builder
            .header("Accept", "application/json")
            .timeout(self.timeouts.request_timeout())
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        let status = resp.status();
        let body = resp.text().await.map_err(BackendError::from_reqwest)?;

        if !status.is_success() {
            tracing::warn!(
                "[HTTP_BACKEND] 后端返回 {}: {}",
                status.as_u16(),
                sanitize_log_message(&body)
            );
            return Err(BackendError::from_status(status.as_u16(), body));
        }
        tracing::debug!("[HTTP_BACKEND] 响应: {}", sanitize_log_message(&body));
        Ok(body)
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn chat(
        &self,
        token: &AccessToken,
        request: &BackendChatRequest,
    ) -> BackendResult<BackendEnvelope> {
        tracing::info!(
            "[HTTP_BACKEND] 聊天请求 model={} messages={}",
            request.model,
            request.messages.len()
        );
        let body = self
            .send_for_body(self.post(&self.chat_url, token, request))
            .await?;

        let envelope: BackendEnvelope = serde_json::from_str(&body).map_err(|e| {
            BackendError::malformed(format!("无法解析后端响应: {}", e)).with_body(body.clone())
        })?;

        if let Some(code) = envelope.failure_code() {
            return Err(BackendError::from_error_code(
                code,
                envelope.message.as_deref(),
                body,
            ));
        }
        Ok(envelope)
    }

    async fn chat_stream(
        &self,
        token: &AccessToken,
        request: &BackendChatRequest,
    ) -> BackendResult<BackendChunkStream> {
        tracing::info!(
            "[HTTP_BACKEND] 流式聊天请求 model={} messages={}",
            request.model,
            request.messages.len()
        );
        let builder = self
            .post(&self.stream_url, token, request)
            .header("Accept", "text/event-stream");

        let resp = with_timeout(self.timeouts.request_timeout(), builder.send())
            .await?
            .map_err(BackendError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = with_timeout(self.timeouts.request_timeout(), resp.text())
                .await?
                .unwrap_or_default();
            tracing::warn!(
                "[HTTP_BACKEND] 流式请求返回 {}: {}",
                status.as_u16(),
                sanitize_log_message(&body)
            );
            return Err(BackendError::from_status(status.as_u16(), body));
        }

        let idle = self.timeouts.stream_idle_timeout();
        let mut bytes = Box::pin(resp.bytes_stream());

        let stream = async_stream::stream! {
            let mut parser = BackendLineParser::new();
            'read: loop {
                let (frames, eof) = match next_with_idle_timeout(idle, &mut bytes).await {
                    Err(e) => {
                        tracing::warn!("[HTTP_BACKEND] 流式读取超时: {}", e);
                        yield Err(BackendError::from(e));
                        break 'read;
                    }
                    Ok(Some(Err(e))) => {
                        yield Err(BackendError::from_reqwest(e));
                        break 'read;
                    }
                    Ok(Some(Ok(chunk))) => (parser.process(&chunk), false),
                    Ok(None) => (parser.finish(), true),
                };

                for frame in frames {
                    match frame {
                        BackendFrame::Chunk { envelope, raw } => {
                            if let Some(code) = envelope.failure_code() {
                                yield Err(BackendError::from_error_code(
                                    code,
                                    envelope.message.as_deref(),
                                    raw,
                                ));
                                break 'read;
                            }
                            yield Ok(envelope);
                        }
                        BackendFrame::Done => break 'read,
                        BackendFrame::Malformed { line, error } => {
                            yield Err(BackendError::malformed(format!("无法解析流式数据块: {}", error))
                                .with_body(line));
                            break 'read;
                        }
                    }
                }

                if eof || parser.state() == ParserState::Finished {
                    break;
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn embed(
        &self,
        token: &AccessToken,
        request: &BackendEmbeddingRequest,
    ) -> BackendResult<BackendEmbeddingEnvelope> {
        let body = self
            .send_for_body(self.post(&self.embedding_url, token, request))
            .await?;

        let envelope: BackendEmbeddingEnvelope = serde_json::from_str(&body).map_err(|e| {
            BackendError::malformed(format!("无法解析向量响应: {}", e)).with_body(body.clone())
        })?;

        if let Some(code) = envelope.failure_code() {
            return Err(BackendError::from_error_code(
                code,
                envelope.message.as_deref(),
                body,
            ));
        }
        Ok(envelope)
    }

    fn name(&self) -> &str {
        "http"
    }
}
