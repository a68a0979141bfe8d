//! 后端调用层 Trait 定义
//!
//! 后端层只负责 HTTP 请求/响应与错误分类，不包含协议转换逻辑。

use crate::models::backend::{
    BackendChatRequest, BackendEmbeddingEnvelope, BackendEmbeddingRequest, BackendEnvelope,
};
use crate::providers::AccessToken;
use crate::resilience::TimeoutError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// 后端流式块
pub type BackendChunkStream = Pin<Box<dyn Stream<Item = BackendResult<BackendEnvelope>> + Send>>;

/// 后端调用结果
pub type BackendResult<T> = Result<T, BackendError>;

/// 后端错误
///
/// 保留上游原始状态码与响应体，供错误响应中的诊断字段使用。
#[derive(Debug, Clone)]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
    pub body: Option<String>,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "{} ({}): {}", self.kind, code, self.message)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for BackendError {}

/// 后端错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// 令牌被后端拒绝
    AuthExpired,
    /// 速率限制
    RateLimited,
    /// 响应无法解析或缺少必要字段
    MalformedUpstream,
    /// 请求或流读取超时
    Timeout,
    /// 其他错误
    Unknown,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthExpired => write!(f, "AuthExpired"),
            Self::RateLimited => write!(f, "RateLimited"),
            Self::MalformedUpstream => write!(f, "MalformedUpstream"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::MalformedUpstream, message)
    }

    fn kind_for_code(code: i64) -> BackendErrorKind {
        match code {
            401 => BackendErrorKind::AuthExpired,
            429 => BackendErrorKind::RateLimited,
            _ => BackendErrorKind::Unknown,
        }
    }

    /// 从 HTTP 状态码推断错误类型
    ///
    /// 响应体中的 `errorCode` 优先于 HTTP 状态码。
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let body_code = serde_json::from_str::<BackendEnvelope>(&body)
            .ok()
            .and_then(|env| env.failure_code());
        let kind = match body_code {
            Some(code) if Self::kind_for_code(code) != BackendErrorKind::Unknown => {
                Self::kind_for_code(code)
            }
            _ => Self::kind_for_code(i64::from(status)),
        };
        Self {
            kind,
            message: format!("后端返回 HTTP {}", status),
            status_code: Some(status),
            body: Some(body),
        }
    }

    /// 从 2xx 响应体中的 `errorCode` 构造错误
    pub fn from_error_code(code: i64, message: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            kind: Self::kind_for_code(code),
            message: format!(
                "后端错误码 {}: {}",
                code,
                message.unwrap_or("no message")
            ),
            status_code: u16::try_from(code).ok(),
            body: Some(body.into()),
        }
    }

    /// 从 reqwest 错误分类
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            BackendErrorKind::Timeout
        } else if e.is_decode() {
            BackendErrorKind::MalformedUpstream
        } else {
            BackendErrorKind::Unknown
        };
        Self {
            kind,
            message: e.to_string(),
            status_code: e.status().map(|s| s.as_u16()),
            body: None,
        }
    }

    /// 是否为认证失败（可刷新令牌后重放一次）
    pub fn is_auth_failure(&self) -> bool {
        self.kind == BackendErrorKind::AuthExpired
    }
}

impl From<TimeoutError> for BackendError {
    fn from(e: TimeoutError) -> Self {
        Self::new(BackendErrorKind::Timeout, e.to_string())
    }
}

/// 聊天/向量后端
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 非流式聊天调用
    async fn chat(
        &self,
        token: &AccessToken,
        request: &BackendChatRequest,
    ) -> BackendResult<BackendEnvelope>;

    /// 流式聊天调用
    ///
    /// 返回的流在读到结束标记或 EOF 时结束；流中携带错误码的块以 `Err` 形式产出。
    async fn chat_stream(
        &self,
        token: &AccessToken,
        request: &BackendChatRequest,
    ) -> BackendResult<BackendChunkStream>;

    /// 单条文本的向量调用
    async fn embed(
        &self,
        token: &AccessToken,
        request: &BackendEmbeddingRequest,
    ) -> BackendResult<BackendEmbeddingEnvelope>;

    fn name(&self) -> &str;
}
