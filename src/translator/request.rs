//! OpenAI 请求 → 后端请求
//!
//! - 消息顺序保持不变，纯文本多段内容拼接为字符串，含图片的内容原样转发
//! - 工具定义展平为 `{name, description, parameters}`
//! - 客户端省略的采样参数使用后端默认值
//! - 后端没有对应能力时返回 `UnsupportedFeature`，不静默丢弃

use super::traits::{RequestTranslator, TranslateError};
use crate::config::{ExtraFieldPolicy, TranslationConfig};
use crate::models::backend::{
    BackendChatRequest, BackendEmbeddingRequest, BackendMessage, BackendMessageContent,
    BackendTool, BackendToolCall,
};
use crate::models::openai::{
    ChatCompletionRequest, ChatMessage, EmbeddingInput, EmbeddingRequest, Tool, ToolChoice,
};
use serde_json::{Map, Value};

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ChatRequestTranslator {
    config: TranslationConfig,
}

impl ChatRequestTranslator {
    pub fn new(config: TranslationConfig) -> Self {
        Self { config }
    }

    fn translate_tools(&self, tools: &[Tool]) -> Result<Vec<BackendTool>, TranslateError> {
        if !self.config.supports_tools {
            return Err(TranslateError::unsupported("后端不支持工具调用"));
        }
        tools
            .iter()
            .map(|tool| {
                if tool.tool_type != "function" {
                    return Err(TranslateError::unsupported(format!(
                        "不支持的工具类型: {}",
                        tool.tool_type
                    )));
                }
                Ok(BackendTool {
                    name: tool.function.name.clone(),
                    description: tool.function.description.clone(),
                    parameters: tool.function.parameters.clone(),
                })
            })
            .collect()
    }

    fn translate_tool_choice(
        &self,
        choice: Option<&ToolChoice>,
        has_tools: bool,
    ) -> Result<Option<Value>, TranslateError> {
        match choice {
            None if has_tools => Ok(Some(Value::String("auto".to_string()))),
            None => Ok(None),
            Some(ToolChoice::Mode(mode)) => match mode.as_str() {
                "none" => Ok(Some(Value::String(mode.clone()))),
                "auto" | "required" => {
                    if !self.config.supports_tools {
                        return Err(TranslateError::unsupported("后端不支持工具调用"));
                    }
                    Ok(Some(Value::String(mode.clone())))
                }
                other => Err(TranslateError::invalid_request(format!(
                    "无效的 tool_choice: {}",
                    other
                ))),
            },
            Some(ToolChoice::Named(named)) => {
                if !self.config.supports_tools {
                    return Err(TranslateError::unsupported("后端不支持工具调用"));
                }
                Ok(Some(serde_json::json!({ "name": named.function.name })))
            }
        }
    }

    fn translate_message(&self, message: ChatMessage) -> Result<BackendMessage, TranslateError> {
        let content = match message.content {
            Some(content) if content.has_images() => {
                if !self.config.supports_images {
                    return Err(TranslateError::unsupported("后端不支持图片输入"));
                }
                BackendMessageContent::from(content)
            }
            Some(content) => BackendMessageContent::Text(content.flatten_text()),
            None => BackendMessageContent::Text(String::new()),
        };

        let has_tool_history = message.tool_calls.is_some() || message.role == "tool";
        if has_tool_history && !self.config.supports_tools {
            return Err(TranslateError::unsupported("后端不支持工具调用"));
        }

        if message.role == "tool" && message.tool_call_id.is_none() {
            return Err(TranslateError::missing_field("tool_call_id"));
        }

        let tool_calls = message.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|call| BackendToolCall {
                    id: Some(call.id),
                    name: Some(call.function.name),
                    arguments: Some(Value::String(call.function.arguments)),
                    function: None,
                })
                .collect()
        });

        // 后端不认识 developer 角色
        let role = if message.role == "developer" {
            "system".to_string()
        } else {
            message.role
        };

        Ok(BackendMessage {
            role,
            content,
            name: message.name,
            tool_calls,
            tool_call_id: message.tool_call_id,
        })
    }

    fn filter_extra(&self, extra: Map<String, Value>) -> Map<String, Value> {
        match self.config.extra_fields {
            ExtraFieldPolicy::Passthrough => extra,
            ExtraFieldPolicy::Drop => {
                if !extra.is_empty() {
                    let keys: Vec<&str> = extra.keys().map(String::as_str).collect();
                    tracing::debug!("[TRANSLATOR] 丢弃后端不支持的字段: {:?}", keys);
                }
                Map::new()
            }
        }
    }
}

impl RequestTranslator for ChatRequestTranslator {
    type Input = ChatCompletionRequest;
    type Output = BackendChatRequest;
    type Error = TranslateError;

    fn translate_request(&self, request: Self::Input) -> Result<Self::Output, Self::Error> {
        if request.model.trim().is_empty() {
            return Err(TranslateError::missing_field("model"));
        }
        if request.messages.is_empty() {
            return Err(TranslateError::missing_field("messages"));
        }
        if request.n.unwrap_or(1) > 1 {
            return Err(TranslateError::unsupported("后端不支持 n > 1"));
        }

        let tools = match request.tools.as_deref() {
            Some(tools) if !tools.is_empty() => Some(self.translate_tools(tools)?),
            _ => None,
        };
        let tool_choice = self.translate_tool_choice(request.tool_choice.as_ref(), tools.is_some())?;

        let messages = request
            .messages
            .into_iter()
            .map(|m| self.translate_message(m))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BackendChatRequest {
            model: self.config.backend_model(&request.model).to_string(),
            messages,
            temperature: request
                .temperature
                .unwrap_or(self.config.default_temperature),
            top_p: request.top_p.unwrap_or(self.config.default_top_p),
            max_tokens: request.max_tokens.unwrap_or(self.config.default_max_tokens),
            echo: false,
            stream: request.stream,
            repetition_penalty: request
                .repetition_penalty
                .unwrap_or(self.config.default_repetition_penalty),
            tools,
            tool_choice,
            response_format: request.response_format,
            seed: request.seed,
            stop: request.stop,
            max_completion_tokens: request.max_completion_tokens,
            parallel_tool_calls: request.parallel_tool_calls,
            prediction: request.prediction,
            stream_options: request.stream_options,
            reasoning_effort: request.reasoning_effort,
            user: request.user,
            extra: self.filter_extra(request.extra),
        })
    }
}

// ============================================================================
// Embeddings
// ============================================================================

/// 向量请求转换，每条输入文本对应一次后端调用
#[derive(Debug, Clone, Default)]
pub struct EmbeddingRequestTranslator {
    config: TranslationConfig,
}

impl EmbeddingRequestTranslator {
    pub fn new(config: TranslationConfig) -> Self {
        Self { config }
    }
}

impl RequestTranslator for EmbeddingRequestTranslator {
    type Input = EmbeddingRequest;
    type Output = Vec<BackendEmbeddingRequest>;
    type Error = TranslateError;

    fn translate_request(&self, request: Self::Input) -> Result<Self::Output, Self::Error> {
        let texts = match request.input {
            EmbeddingInput::Text(text) => vec![text],
            EmbeddingInput::TextList(texts) => texts,
            EmbeddingInput::Tokens(_) | EmbeddingInput::TokenBatches(_) => {
                return Err(TranslateError::unsupported("后端只接受文本输入，不支持 token 数组"));
            }
        };

        if texts.is_empty() {
            return Err(TranslateError::invalid_request("input 不能为空"));
        }
        if texts.iter().any(|t| t.is_empty()) {
            return Err(TranslateError::invalid_request("input 不能包含空字符串"));
        }
        if request.dimensions == Some(0) {
            return Err(TranslateError::invalid_request("dimensions 必须大于 0"));
        }

        let model = self.config.backend_model(&request.model).to_string();
        let encoding_format = request.encoding_format.map(|f| f.as_str().to_string());

        Ok(texts
            .into_iter()
            .map(|text| BackendEmbeddingRequest {
                model: model.clone(),
                text,
                encoding_format: encoding_format.clone(),
                dimensions: request.dimensions,
                user: request.user.clone(),
            })
            .collect())
    }
}
