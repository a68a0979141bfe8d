//! 协议转换器 Trait 定义
//!
//! `RequestTranslator` 把 OpenAI 请求转换为后端请求，必须是纯函数，不做任何 I/O。

/// 请求转换器 Trait
///
/// - `Input`: 前端请求类型（如 OpenAI ChatCompletionRequest）
/// - `Output`: 后端请求类型
pub trait RequestTranslator {
    type Input;
    type Output;
    type Error: std::error::Error + Send + Sync + 'static;

    fn translate_request(&self, request: Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 转换错误
#[derive(Debug, Clone)]
pub struct TranslateError {
    pub kind: TranslateErrorKind,
    pub message: String,
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TranslateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateErrorKind {
    /// 无效的请求格式
    InvalidRequest,
    /// 后端没有对应能力
    UnsupportedFeature,
    /// 缺少必要字段
    MissingField,
}

impl std::fmt::Display for TranslateErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "InvalidRequest"),
            Self::UnsupportedFeature => write!(f, "UnsupportedFeature"),
            Self::MissingField => write!(f, "MissingField"),
        }
    }
}

impl TranslateError {
    pub fn new(kind: TranslateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(TranslateErrorKind::InvalidRequest, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(TranslateErrorKind::UnsupportedFeature, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            TranslateErrorKind::MissingField,
            format!("Missing required field: {}", field),
        )
    }
}
