//! 流式中继
//!
//! 状态只向前推进：
//!
//! ```text
//! Opening ──> Streaming ──> Closing ──> Done
//! ```
//!
//! - `Opening`: 建立后端流并读到第一个有效数据块。这一阶段客户端还没有收到任何字节，
//!   认证失败交给 `RetryCoordinator` 刷新令牌后重放。
//! - `Streaming`: 每个后端块转换为零个或多个 OpenAI SSE 事件。
//! - `Closing`: 收到结束原因或后端 EOF，补齐结束块并输出 `[DONE]`。
//! - 流式输出开始后出现的错误不再重试，输出一个终止性错误事件后关闭。
//!
//! 客户端断开时输出流被丢弃，后端流随之释放，连接被取消。

use crate::backends::{BackendChunkStream, ChatBackend};
use crate::config::StreamMode;
use crate::models::backend::{BackendChatRequest, BackendEnvelope};
use crate::processor::GatewayError;
use crate::resilience::RetryCoordinator;
use crate::stream::events::{StopReason, StreamEvent};
use crate::stream::generators::OpenAiSseGenerator;
use crate::stream::simulated;
use crate::translator::ResponseTranslator;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

/// 发往客户端的 SSE 事件流
pub type SseStream = Pin<Box<dyn Stream<Item = String> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelayState {
    Opening,
    Streaming,
    Closing,
    Done,
}

/// 建立阶段读到的内容
struct Opened {
    prefetched: Vec<BackendEnvelope>,
    upstream: Option<BackendChunkStream>,
}

pub struct StreamRelay {
    backend: Arc<dyn ChatBackend>,
    retry: RetryCoordinator,
    translator: ResponseTranslator,
    generator: OpenAiSseGenerator,
    mode: StreamMode,
    simulated_chunks: usize,
    state: RelayState,
    pending: VecDeque<BackendEnvelope>,
    upstream: Option<BackendChunkStream>,
}

impl StreamRelay {
    /// `model` 为客户端请求中的模型 id
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        retry: RetryCoordinator,
        translator: ResponseTranslator,
        model: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            retry,
            translator,
            generator: OpenAiSseGenerator::new(model),
            mode: StreamMode::Native,
            simulated_chunks: 5,
            state: RelayState::Opening,
            pending: VecDeque::new(),
            upstream: None,
        }
    }

    pub fn with_mode(mut self, mode: StreamMode, simulated_chunks: usize) -> Self {
        self.mode = mode;
        self.simulated_chunks = simulated_chunks;
        self
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn response_id(&self) -> &str {
        self.generator.response_id()
    }

    fn transition(&mut self, next: RelayState) {
        if next <= self.state {
            tracing::warn!(
                "[STREAM] 忽略非法的状态回退: {:?} -> {:?}",
                self.state,
                next
            );
            return;
        }
        tracing::trace!("[STREAM] {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// 建立后端流
    ///
    /// 读到第一个能产生事件的数据块（或流结束）才算建立成功，
    /// 因此首块之前的认证失败同样会被刷新重放。
    pub async fn open(&mut self, request: &BackendChatRequest) -> Result<(), GatewayError> {
        if self.state != RelayState::Opening {
            return Ok(());
        }

        let backend = self.backend.clone();
        let translator = &self.translator;
        let mode = self.mode;
        let pieces = self.simulated_chunks;

        let opened = self
            .retry
            .execute(|token| {
                let backend = backend.clone();
                async move {
                    let mut upstream = match mode {
                        StreamMode::Native => backend.chat_stream(&token, request).await?,
                        StreamMode::Simulated => {
                            let mut single = request.clone();
                            single.stream = false;
                            let envelope = backend.chat(&token, &single).await?;
                            simulated::into_chunk_stream(envelope, pieces)?
                        }
                    };

                    let mut prefetched = Vec::new();
                    while let Some(item) = upstream.next().await {
                        let envelope = item?;
                        let meaningful = !translator.chunk_events(&envelope).is_empty();
                        prefetched.push(envelope);
                        if meaningful {
                            return Ok(Opened {
                                prefetched,
                                upstream: Some(upstream),
                            });
                        }
                    }
                    Ok(Opened {
                        prefetched,
                        upstream: None,
                    })
                }
            })
            .await?;

        self.pending = opened.prefetched.into();
        self.upstream = opened.upstream;
        self.transition(RelayState::Streaming);
        tracing::debug!(
            "[STREAM] 后端流已建立: id={} backend={}",
            self.generator.response_id(),
            self.backend.name()
        );
        Ok(())
    }

    /// 单个后端块 → SSE 事件，遇到结束原因时进入 Closing 并输出 `[DONE]`
    fn relay_chunk(&mut self, envelope: &BackendEnvelope) -> Vec<String> {
        let mut frames = Vec::new();
        for event in self.translator.chunk_events(envelope) {
            frames.extend(self.generator.generate(&event));
            if event.is_stop() {
                frames.extend(self.close());
                break;
            }
        }
        frames
    }

    fn close(&mut self) -> Vec<String> {
        self.transition(RelayState::Closing);
        let mut frames = Vec::new();
        if !self.generator.is_finished() {
            frames.extend(
                self.generator
                    .generate(&StreamEvent::stop(StopReason::EndTurn)),
            );
        }
        frames.push(self.generator.generate_done());
        self.transition(RelayState::Done);
        frames
    }

    fn fail(&mut self, error: &GatewayError) -> String {
        tracing::warn!(
            "[STREAM] 流式输出中途失败，发送错误事件后关闭: id={} error={}",
            self.generator.response_id(),
            error
        );
        self.transition(RelayState::Done);
        self.generator.generate_error(&error.to_json())
    }

    /// 驱动后端流并输出 SSE 事件
    ///
    /// 必须先调用 `open`。
    pub fn into_sse_stream(mut self) -> SseStream {
        Box::pin(async_stream::stream! {
            while let Some(envelope) = self.pending.pop_front() {
                for frame in self.relay_chunk(&envelope) {
                    yield frame;
                }
                if self.state == RelayState::Done {
                    return;
                }
            }

            if let Some(mut upstream) = self.upstream.take() {
                while let Some(item) = upstream.next().await {
                    match item {
                        Ok(envelope) => {
                            for frame in self.relay_chunk(&envelope) {
                                yield frame;
                            }
                            if self.state == RelayState::Done {
                                return;
                            }
                        }
                        Err(e) => {
                            yield self.fail(&GatewayError::from(e));
                            return;
                        }
                    }
                }
            }

            for frame in self.close() {
                yield frame;
            }
        })
    }
}

impl Drop for StreamRelay {
    fn drop(&mut self) {
        if self.state == RelayState::Streaming {
            tracing::info!(
                "[STREAM] {}: id={}，取消后端流",
                GatewayError::ClientDisconnected,
                self.generator.response_id()
            );
        }
    }
}
