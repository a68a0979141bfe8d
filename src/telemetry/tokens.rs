//! Token 估算
//!
//! 后端响应不带用量时，使用 tiktoken 估算 prompt/completion token 数。

use crate::models::backend::BackendMessage;

/// Token 估算器
pub struct TokenEstimator {
    /// cl100k_base，适用于 GPT-4/GPT-3.5 等
    default_bpe: tiktoken_rs::CoreBPE,
    /// o200k_base，适用于 GPT-4o 等新模型
    o200k_bpe: tiktoken_rs::CoreBPE,
}

impl TokenEstimator {
    pub fn new() -> Result<Self, TokenEstimatorError> {
        let default_bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| TokenEstimatorError::InitializationError(e.to_string()))?;
        let o200k_bpe = tiktoken_rs::o200k_base()
            .map_err(|e| TokenEstimatorError::InitializationError(e.to_string()))?;

        Ok(Self {
            default_bpe,
            o200k_bpe,
        })
    }

    /// 估算文本的 Token 数量
    pub fn estimate(&self, text: &str, model: Option<&str>) -> u32 {
        let bpe = self.select_bpe(model);
        bpe.encode_with_special_tokens(text).len() as u32
    }

    /// 估算消息列表的 Token 数量，包含每条消息的格式化开销
    pub fn estimate_messages(&self, messages: &[BackendMessage], model: Option<&str>) -> u32 {
        let bpe = self.select_bpe(model);
        let mut total_tokens = 0u32;

        // <|im_start|>role\ncontent<|im_end|>
        let tokens_per_message = 4;
        let tokens_per_name = 1;

        for message in messages {
            total_tokens += tokens_per_message;
            total_tokens += bpe.encode_with_special_tokens(&message.role).len() as u32;
            total_tokens += bpe.encode_with_special_tokens(&message.content.text()).len() as u32;
            if message.name.is_some() {
                total_tokens += tokens_per_name;
            }
            if let Some(calls) = &message.tool_calls {
                for call in calls {
                    if let Some(name) = call.function_name() {
                        total_tokens += bpe.encode_with_special_tokens(name).len() as u32;
                    }
                    total_tokens +=
                        bpe.encode_with_special_tokens(&call.arguments_string()).len() as u32;
                }
            }
        }

        // <|im_start|>assistant
        total_tokens += 3;

        total_tokens
    }

    fn select_bpe(&self, model: Option<&str>) -> &tiktoken_rs::CoreBPE {
        match model {
            Some(m) if m.contains("gpt-4o") || m.contains("o1") || m.contains("o3") => {
                &self.o200k_bpe
            }
            _ => &self.default_bpe,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenEstimatorError {
    #[error("Token 估算器初始化失败: {0}")]
    InitializationError(String),
}
