//! 后端协议数据模型
//!
//! 后端使用自有的认证码换令牌流程和 `{"data": {...}}` 包装格式。

use super::openai::{ContentPart, MessageContent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// 令牌端点
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub code: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenEnvelope {
    #[serde(default, rename = "errorCode")]
    pub error_code: Option<i64>,
    #[serde(default, alias = "msg")]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<TokenData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenData {
    #[serde(default)]
    pub access_token: Option<String>,
    /// 有效期（秒），数字或数字字符串
    #[serde(default)]
    pub expires_in: Option<Value>,
}

impl TokenData {
    /// 解析有效期秒数，无法识别的取值返回 `None`
    pub fn expires_in_secs(&self) -> Option<i64> {
        match self.expires_in.as_ref()? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

// ============================================================================
// Chat 请求
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendChatRequest {
    pub model: String,
    pub messages: Vec<BackendMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub echo: bool,
    pub stream: bool,
    pub repetition_penalty: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<BackendTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// 按透传策略保留的客户端未知字段
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendMessage {
    pub role: String,
    pub content: BackendMessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<BackendToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// 消息内容
///
/// 纯文本消息展平为字符串；含图片的多段内容在后端支持图片时原样转发。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BackendMessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl BackendMessageContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            BackendMessageContent::Text(text) => Some(text),
            BackendMessageContent::Parts(_) => None,
        }
    }

    /// 文本部分，用于用量估算
    pub fn text(&self) -> String {
        match self {
            BackendMessageContent::Text(text) => text.clone(),
            BackendMessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<MessageContent> for BackendMessageContent {
    fn from(content: MessageContent) -> Self {
        match content {
            MessageContent::Text(text) => BackendMessageContent::Text(text),
            MessageContent::Parts(parts) => BackendMessageContent::Parts(parts),
        }
    }
}

impl From<String> for BackendMessageContent {
    fn from(text: String) -> Self {
        BackendMessageContent::Text(text)
    }
}

impl From<&str> for BackendMessageContent {
    fn from(text: &str) -> Self {
        BackendMessageContent::Text(text.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// 后端工具调用
///
/// 后端既可能返回扁平的 `{name, arguments}`，也可能返回
/// OpenAI 风格的 `{id, type, function: {name, arguments}}`，两种都接受。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<BackendFunction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendFunction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<Value>,
}

impl BackendToolCall {
    pub fn function_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or_else(|| self.function.as_ref().and_then(|f| f.name.as_deref()))
    }

    /// 参数字符串
    ///
    /// 字符串参数逐字节返回；结构化参数按原有键顺序序列化。
    pub fn arguments_string(&self) -> String {
        let raw = self
            .arguments
            .as_ref()
            .or_else(|| self.function.as_ref().and_then(|f| f.arguments.as_ref()));
        match raw {
            None | Some(Value::Null) => "{}".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

// ============================================================================
// Chat 响应 / 流式块
// ============================================================================

/// 后端响应包装，非流式响应与流式每一行共用此结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendEnvelope {
    #[serde(default, rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(default, alias = "msg", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BackendData>,
}

impl BackendEnvelope {
    /// 携带非成功错误码
    pub fn failure_code(&self) -> Option<i64> {
        match self.error_code {
            None | Some(0) | Some(200) => None,
            Some(code) => Some(code),
        }
    }

    pub fn content(&self) -> Option<&BackendContent> {
        self.data.as_ref().and_then(|d| d.content.as_ref())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.finish_reason.as_deref())
    }

    pub fn usage(&self) -> Option<BackendUsage> {
        self.data.as_ref().and_then(|d| d.usage)
    }

    /// 构造文本片段，供模拟流式和测试使用
    pub fn text_fragment(text: impl Into<String>) -> Self {
        Self {
            data: Some(BackendData {
                content: Some(BackendContent {
                    content: Some(text.into()),
                    tool_calls: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn finish(reason: impl Into<String>) -> Self {
        Self {
            data: Some(BackendData {
                finish_reason: Some(reason.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<BackendContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<BackendUsage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendContent {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<BackendToolCall>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

// ============================================================================
// Embeddings
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendEmbeddingRequest {
    pub model: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendEmbeddingEnvelope {
    #[serde(default, rename = "errorCode")]
    pub error_code: Option<i64>,
    #[serde(default, alias = "msg")]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<BackendEmbeddingData>,
}

impl BackendEmbeddingEnvelope {
    pub fn failure_code(&self) -> Option<i64> {
        match self.error_code {
            None | Some(0) | Some(200) => None,
            Some(code) => Some(code),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendEmbeddingData {
    /// 浮点数组或 base64 编码的 f32 小端缓冲区
    pub content: Value,
}
