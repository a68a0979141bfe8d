//! 令牌来源 Trait 定义
//!
//! 统一的后端令牌获取接口，`TokenManager` 通过它完成实际的网络换取。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// 后端访问令牌
///
/// 令牌值只在出站请求头中使用，`Debug` 输出会脱敏。
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
    acquired_at: DateTime<Utc>,
}

impl AccessToken {
    /// 以当前时间为获取时间创建令牌
    pub fn new(value: impl Into<String>, ttl: Duration) -> Self {
        let acquired_at = Utc::now();
        Self {
            value: value.into(),
            expires_at: acquired_at + ttl,
            acquired_at,
        }
    }

    /// 有效期过大导致时间溢出时返回 `None`
    pub fn try_new(value: impl Into<String>, ttl: Duration) -> Option<Self> {
        let acquired_at = Utc::now();
        let expires_at = acquired_at.checked_add_signed(ttl)?;
        Some(Self {
            value: value.into(),
            expires_at,
            acquired_at,
        })
    }

    pub fn with_expiry(
        value: impl Into<String>,
        acquired_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            value: value.into(),
            expires_at,
            acquired_at,
        }
    }

    /// 令牌原文，仅用于构造出站认证头
    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// 检查令牌在安全余量之后是否仍然有效
    pub fn is_valid_for(&self, margin: Duration) -> bool {
        self.expires_at > Utc::now() + margin
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"***")
            .field("expires_at", &self.expires_at)
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

/// 令牌获取错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenError {
    /// 网络错误（含超时）
    #[error("令牌端点请求失败: {0}")]
    Network(String),

    /// 令牌端点返回非 2xx，`body` 已脱敏
    #[error("令牌端点返回 HTTP {status}")]
    Status { status: u16, body: String },

    /// 响应中缺少令牌或格式错误
    ///
    /// 2xx 响应体可能含有令牌原文，不随错误携带。
    #[error("令牌响应格式错误: {message}")]
    Malformed { message: String },

    #[error("令牌请求超时")]
    Timeout,
}

impl TokenError {
    /// 上游原始状态码与响应体，用于诊断
    pub fn upstream(&self) -> (Option<u16>, Option<&str>) {
        match self {
            TokenError::Status { status, body } => (Some(*status), Some(body.as_str())),
            _ => (None, None),
        }
    }
}

/// 令牌来源 Trait
///
/// 每次调用 `acquire` 都代表一次真实的网络换取，缓存由 `TokenManager` 负责。
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// 获取新的访问令牌
    async fn acquire(&self) -> Result<AccessToken, TokenError>;

    /// 来源名称（用于日志）
    fn name(&self) -> &'static str;
}
