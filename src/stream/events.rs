//! 统一流事件类型
//!
//! 后端流式块先转换为 `StreamEvent`，再由生成器输出 OpenAI SSE。

use serde::{Deserialize, Serialize};

/// 流事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// 文本增量
    TextDelta { text: String },

    /// 完整的工具调用，参数字符串原样保留
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },

    /// 消息结束
    MessageStop { stop_reason: StopReason },
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn stop(stop_reason: StopReason) -> Self {
        Self::MessageStop { stop_reason }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Self::MessageStop { .. })
    }
}

/// 停止原因
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// 正常结束
    #[default]
    EndTurn,
    /// 达到最大 token 数
    MaxTokens,
    /// 需要工具调用
    ToolUse,
    /// 内容过滤
    ContentFilter,
    /// 其他原因
    Other(String),
}

impl StopReason {
    /// 从后端的 finish_reason 解析
    pub fn from_backend(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "stop" | "end_turn" | "eos" => Self::EndTurn,
            "length" | "max_tokens" => Self::MaxTokens,
            "tool_calls" | "tool_use" | "function_call" => Self::ToolUse,
            "content_filter" | "sensitive" => Self::ContentFilter,
            _ => Self::Other(s.to_string()),
        }
    }

    /// 转换为 OpenAI 格式的字符串
    pub fn to_openai_str(&self) -> &str {
        match self {
            Self::EndTurn => "stop",
            Self::MaxTokens => "length",
            Self::ToolUse => "tool_calls",
            Self::ContentFilter => "content_filter",
            Self::Other(_) => "stop",
        }
    }
}
