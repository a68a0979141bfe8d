//! OpenAI SSE 生成器
//!
//! 将 `StreamEvent` 转换为 OpenAI Chat Completions SSE 格式。
//!
//! ```text
//! data: {"id":"chatcmpl-xxx","object":"chat.completion.chunk","created":1234567890,"model":"gpt-4","choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"},"finish_reason":null}]}
//!
//! data: {"id":"chatcmpl-xxx",...,"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}
//!
//! data: [DONE]
//! ```
//!
//! 第一个块携带 `role`，之后的块只携带增量，最后一个块携带 `finish_reason` 且 delta 为空。

use crate::models::openai::{
    ChatCompletionChunk, FunctionCallDelta, StreamChoice, StreamDelta, ToolCallDelta,
};
use crate::stream::events::{StopReason, StreamEvent};

pub const DONE_EVENT: &str = "data: [DONE]\n\n";

#[derive(Debug)]
pub struct OpenAiSseGenerator {
    response_id: String,
    model: String,
    created: i64,
    role_sent: bool,
    next_tool_index: u32,
    finished: bool,
}

impl OpenAiSseGenerator {
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_id(
            format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            model,
        )
    }

    /// 使用指定的响应 ID 创建生成器
    pub fn with_id(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            response_id: id.into(),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            role_sent: false,
            next_tool_index: 0,
            finished: false,
        }
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    /// 是否已输出结束块或错误事件
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 将事件转换为零个或多个 SSE 事件字符串
    pub fn generate(&mut self, event: &StreamEvent) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }

        match event {
            StreamEvent::TextDelta { text } => {
                if text.is_empty() && self.role_sent {
                    return Vec::new();
                }
                let delta = StreamDelta {
                    role: self.take_role(),
                    content: Some(text.clone()),
                    tool_calls: None,
                };
                self.frame(delta, None).into_iter().collect()
            }

            StreamEvent::ToolCall {
                id,
                name,
                arguments,
            } => {
                let index = self.next_tool_index;
                self.next_tool_index += 1;
                let delta = StreamDelta {
                    role: self.take_role(),
                    content: None,
                    tool_calls: Some(vec![ToolCallDelta {
                        index,
                        id: Some(id.clone()),
                        call_type: Some("function".to_string()),
                        function: Some(FunctionCallDelta {
                            name: Some(name.clone()),
                            arguments: Some(arguments.clone()),
                        }),
                    }]),
                };
                self.frame(delta, None).into_iter().collect()
            }

            StreamEvent::MessageStop { stop_reason } => {
                let mut out = Vec::new();
                if !self.role_sent {
                    let delta = StreamDelta {
                        role: self.take_role(),
                        content: Some(String::new()),
                        tool_calls: None,
                    };
                    out.extend(self.frame(delta, None));
                }

                // 有工具调用时正常结束视为 tool_calls
                let reason = if self.next_tool_index > 0 && *stop_reason == StopReason::EndTurn {
                    StopReason::ToolUse.to_openai_str().to_string()
                } else {
                    stop_reason.to_openai_str().to_string()
                };
                out.extend(self.frame(StreamDelta::default(), Some(reason)));
                self.finished = true;
                out
            }
        }
    }

    /// 结束标记
    pub fn generate_done(&self) -> String {
        DONE_EVENT.to_string()
    }

    /// 终止性错误事件，之后不再输出任何块
    pub fn generate_error(&mut self, error: &serde_json::Value) -> String {
        self.finished = true;
        format!("data: {}\n\n", error)
    }

    fn take_role(&mut self) -> Option<String> {
        if self.role_sent {
            None
        } else {
            self.role_sent = true;
            Some("assistant".to_string())
        }
    }

    fn frame(&self, delta: StreamDelta, finish_reason: Option<String>) -> Option<String> {
        let chunk = ChatCompletionChunk {
            id: self.response_id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        };
        match serde_json::to_string(&chunk) {
            Ok(json) => Some(format!("data: {}\n\n", json)),
            Err(e) => {
                tracing::error!("[OPENAI_SSE] 序列化流式块失败: {}", e);
                None
            }
        }
    }
}
