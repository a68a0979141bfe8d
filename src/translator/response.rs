//! 后端响应 → OpenAI 响应
//!
//! 非流式响应、流式单块和向量结果都在这里转换。
//! 结构不符合预期时返回 `MalformedUpstream`，并附带原始响应体用于诊断。

use crate::backends::BackendError;
use crate::config::DimensionPolicy;
use crate::models::backend::{
    BackendChatRequest, BackendEmbeddingEnvelope, BackendEmbeddingRequest, BackendEnvelope,
    BackendToolCall, BackendUsage,
};
use crate::models::openai::{
    ChatCompletionResponse, Choice, EmbeddingObject, EmbeddingResponse, EmbeddingUsage,
    EmbeddingVector, EncodingFormat, FunctionCall, ResponseMessage, ToolCall, Usage,
};
use crate::stream::events::{StopReason, StreamEvent};
use crate::telemetry::TokenEstimator;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ResponseTranslator {
    estimator: Option<Arc<TokenEstimator>>,
    dimension_policy: DimensionPolicy,
}

impl ResponseTranslator {
    pub fn new(estimator: Option<Arc<TokenEstimator>>, dimension_policy: DimensionPolicy) -> Self {
        Self {
            estimator,
            dimension_policy,
        }
    }

    /// 非流式 chat 响应
    ///
    /// `model` 为客户端请求中的模型 id，而不是映射后的后端模型。
    pub fn chat_response(
        &self,
        envelope: &BackendEnvelope,
        request: &BackendChatRequest,
        model: &str,
    ) -> Result<ChatCompletionResponse, BackendError> {
        let content = envelope.content().ok_or_else(|| {
            BackendError::malformed("后端响应缺少 data.content").with_body(raw_body(envelope))
        })?;

        let tool_calls = match content.tool_calls.as_deref() {
            Some(calls) if !calls.is_empty() => Some(
                calls
                    .iter()
                    .map(|call| convert_tool_call(call).map_err(|e| e.with_body(raw_body(envelope))))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            _ => None,
        };
        let has_tool_calls = tool_calls.is_some();

        let text = content.content.clone().unwrap_or_default();
        let finish_reason = match envelope.finish_reason() {
            Some(reason) => finish_reason_str(StopReason::from_backend(reason), has_tool_calls),
            None => finish_reason_str(StopReason::EndTurn, has_tool_calls),
        };

        let usage = self.chat_usage(envelope.usage(), request, &text, tool_calls.as_deref());

        Ok(ChatCompletionResponse {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_string(),
                    // 只有工具调用时 content 为 null
                    content: if text.is_empty() && has_tool_calls {
                        None
                    } else {
                        Some(text)
                    },
                    tool_calls,
                },
                finish_reason,
            }],
            usage,
        })
    }

    /// 单个后端流式块 → 零个或多个流事件
    pub fn chunk_events(&self, envelope: &BackendEnvelope) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(content) = envelope.content() {
            if let Some(text) = content.content.as_deref().filter(|t| !t.is_empty()) {
                events.push(StreamEvent::text(text));
            }
            for call in content.tool_calls.iter().flatten() {
                events.push(StreamEvent::ToolCall {
                    id: call.id.clone().unwrap_or_else(new_call_id),
                    name: call.function_name().unwrap_or_default().to_string(),
                    arguments: call.arguments_string(),
                });
            }
        }

        if let Some(reason) = envelope.finish_reason() {
            events.push(StreamEvent::stop(StopReason::from_backend(reason)));
        }

        events
    }

    /// 向量结果按输入顺序组装为 OpenAI 列表
    pub fn embedding_response(
        &self,
        results: Vec<BackendEmbeddingEnvelope>,
        requests: &[BackendEmbeddingRequest],
        format: EncodingFormat,
        model: &str,
    ) -> Result<EmbeddingResponse, BackendError> {
        let mut data = Vec::with_capacity(results.len());

        for (index, (envelope, request)) in results.iter().zip(requests).enumerate() {
            let content = envelope
                .data
                .as_ref()
                .map(|d| &d.content)
                .ok_or_else(|| BackendError::malformed("向量响应缺少 data.content"))?;

            let mut vector = decode_vector(content)?;
            if let Some(dimensions) = request.dimensions {
                vector = self.apply_dimensions(vector, dimensions as usize);
            }

            data.push(EmbeddingObject {
                object: "embedding".to_string(),
                embedding: encode_vector(vector, format),
                index: index as u32,
            });
        }

        let prompt_tokens = match &self.estimator {
            Some(estimator) => requests
                .iter()
                .map(|r| estimator.estimate(&r.text, Some(&r.model)))
                .sum(),
            None => 0,
        };

        Ok(EmbeddingResponse {
            object: "list".to_string(),
            data,
            model: model.to_string(),
            usage: EmbeddingUsage {
                prompt_tokens,
                total_tokens: prompt_tokens,
            },
        })
    }

    fn apply_dimensions(&self, vector: Vec<f32>, dimensions: usize) -> Vec<f32> {
        if vector.len() <= dimensions {
            return vector;
        }
        match self.dimension_policy {
            DimensionPolicy::Passthrough => {
                tracing::debug!(
                    "[TRANSLATOR] 后端返回 {} 维向量，请求 {} 维，按配置原样返回",
                    vector.len(),
                    dimensions
                );
                vector
            }
            DimensionPolicy::Truncate => truncate_normalized(vector, dimensions),
        }
    }

    fn chat_usage(
        &self,
        backend: Option<BackendUsage>,
        request: &BackendChatRequest,
        text: &str,
        tool_calls: Option<&[ToolCall]>,
    ) -> Usage {
        if let Some(u) = backend.filter(|u| u.prompt_tokens > 0 || u.completion_tokens > 0) {
            let total = if u.total_tokens > 0 {
                u.total_tokens
            } else {
                u.prompt_tokens + u.completion_tokens
            };
            return Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: total,
            };
        }

        let Some(estimator) = &self.estimator else {
            return Usage::default();
        };
        let model = Some(request.model.as_str());
        let prompt = estimator.estimate_messages(&request.messages, model);
        let mut completion = estimator.estimate(text, model);
        for call in tool_calls.into_iter().flatten() {
            completion += estimator.estimate(&call.function.name, model);
            completion += estimator.estimate(&call.function.arguments, model);
        }
        Usage::new(prompt, completion)
    }
}

fn convert_tool_call(call: &BackendToolCall) -> Result<ToolCall, BackendError> {
    let name = call
        .function_name()
        .ok_or_else(|| BackendError::malformed("工具调用缺少 name"))?;
    Ok(ToolCall {
        id: call.id.clone().unwrap_or_else(new_call_id),
        call_type: "function".to_string(),
        function: FunctionCall {
            name: name.to_string(),
            arguments: call.arguments_string(),
        },
    })
}

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

fn finish_reason_str(reason: StopReason, has_tool_calls: bool) -> String {
    if has_tool_calls && reason == StopReason::EndTurn {
        return StopReason::ToolUse.to_openai_str().to_string();
    }
    reason.to_openai_str().to_string()
}

fn raw_body(envelope: &BackendEnvelope) -> String {
    serde_json::to_string(envelope).unwrap_or_default()
}

/// 浮点数组或 base64 编码的 f32 小端缓冲区
fn decode_vector(content: &Value) -> Result<Vec<f32>, BackendError> {
    match content {
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| BackendError::malformed("向量包含非数值元素"))
            })
            .collect(),
        Value::String(encoded) => {
            let bytes = BASE64
                .decode(encoded)
                .map_err(|e| BackendError::malformed(format!("向量 base64 解码失败: {}", e)))?;
            if bytes.len() % 4 != 0 {
                return Err(BackendError::malformed("向量字节长度不是 4 的倍数"));
            }
            Ok(bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect())
        }
        other => Err(BackendError::malformed("无法识别的向量格式").with_body(other.to_string())),
    }
}

fn encode_vector(vector: Vec<f32>, format: EncodingFormat) -> EmbeddingVector {
    match format {
        EncodingFormat::Float => EmbeddingVector::Float(vector),
        EncodingFormat::Base64 => {
            let bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
            EmbeddingVector::Base64(BASE64.encode(bytes))
        }
    }
}

/// 截断后重新做 L2 归一化
fn truncate_normalized(mut vector: Vec<f32>, dimensions: usize) -> Vec<f32> {
    vector.truncate(dimensions);
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
    vector
}
