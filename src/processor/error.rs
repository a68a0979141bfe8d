//! 网关错误类型
//!
//! 所有对客户端可见的错误都渲染为 OpenAI 风格的错误包装，
//! 后端产生的错误额外携带 `upstream` 诊断字段（原始状态码与响应体）。

use crate::backends::{BackendError, BackendErrorKind};
use crate::providers::TokenError;
use crate::translator::{TranslateError, TranslateErrorKind};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// 无法获取后端令牌
    #[error("令牌获取失败: {0}")]
    TokenAcquisitionFailed(TokenError),

    /// 刷新令牌重放后后端仍拒绝
    #[error("后端认证失败: {0}")]
    AuthExpiredUpstream(BackendError),

    #[error("后端速率限制: {0}")]
    RateLimited(BackendError),

    #[error("后端响应格式错误: {0}")]
    MalformedUpstreamResponse(BackendError),

    #[error("后端调用超时: {0}")]
    Timeout(BackendError),

    #[error("后端调用失败: {0}")]
    Upstream(BackendError),

    #[error("不支持的功能: {0}")]
    UnsupportedFeature(String),

    #[error("无效请求: {0}")]
    InvalidRequest(String),

    #[error("模型不存在: {0}")]
    ModelNotFound(String),

    /// 客户端断开，只用于日志，不会写回客户端
    #[error("客户端已断开")]
    ClientDisconnected,
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_) | GatewayError::UnsupportedFeature(_) => 400,
            GatewayError::ModelNotFound(_) => 404,
            GatewayError::RateLimited(_) => 429,
            GatewayError::ClientDisconnected => 499,
            GatewayError::TokenAcquisitionFailed(_)
            | GatewayError::AuthExpiredUpstream(_)
            | GatewayError::MalformedUpstreamResponse(_)
            | GatewayError::Upstream(_) => 502,
            GatewayError::Timeout(_) => 504,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::TokenAcquisitionFailed(_) => "token_acquisition_failed",
            GatewayError::AuthExpiredUpstream(_) => "upstream_auth_error",
            GatewayError::RateLimited(_) => "rate_limit_error",
            GatewayError::MalformedUpstreamResponse(_) => "upstream_malformed_response",
            GatewayError::Timeout(_) => "timeout_error",
            GatewayError::Upstream(_) => "upstream_error",
            GatewayError::UnsupportedFeature(_) => "unsupported_feature",
            GatewayError::InvalidRequest(_) => "invalid_request_error",
            GatewayError::ModelNotFound(_) => "model_not_found",
            GatewayError::ClientDisconnected => "client_disconnected",
        }
    }

    /// 上游原始状态码与响应体
    pub fn upstream(&self) -> Option<(Option<u16>, Option<&str>)> {
        match self {
            GatewayError::AuthExpiredUpstream(e)
            | GatewayError::RateLimited(e)
            | GatewayError::MalformedUpstreamResponse(e)
            | GatewayError::Timeout(e)
            | GatewayError::Upstream(e) => Some((e.status_code, e.body.as_deref())),
            GatewayError::TokenAcquisitionFailed(e) => Some(e.upstream()),
            _ => None,
        }
    }

    /// 转换为 JSON 错误响应
    pub fn to_json(&self) -> serde_json::Value {
        let mut error = serde_json::json!({
            "message": self.to_string(),
            "type": self.error_type(),
            "code": self.status_code()
        });
        if let Some((status, body)) = self.upstream() {
            error["upstream"] = serde_json::json!({
                "status": status,
                "body": body,
            });
        }
        serde_json::json!({ "error": error })
    }

    /// 记录带上下文的错误日志
    pub fn log_with_context(&self, request_id: &str, model: &str) {
        tracing::error!(
            request_id = %request_id,
            model = %model,
            error_type = %self.error_type(),
            status = self.status_code(),
            error_message = %self.to_string(),
            "[GATEWAY] 请求处理失败"
        );
    }
}

impl From<BackendError> for GatewayError {
    fn from(e: BackendError) -> Self {
        match e.kind {
            BackendErrorKind::AuthExpired => GatewayError::AuthExpiredUpstream(e),
            BackendErrorKind::RateLimited => GatewayError::RateLimited(e),
            BackendErrorKind::MalformedUpstream => GatewayError::MalformedUpstreamResponse(e),
            BackendErrorKind::Timeout => GatewayError::Timeout(e),
            BackendErrorKind::Unknown => GatewayError::Upstream(e),
        }
    }
}

impl From<TokenError> for GatewayError {
    fn from(e: TokenError) -> Self {
        GatewayError::TokenAcquisitionFailed(e)
    }
}

impl From<TranslateError> for GatewayError {
    fn from(e: TranslateError) -> Self {
        match e.kind {
            TranslateErrorKind::UnsupportedFeature => GatewayError::UnsupportedFeature(e.message),
            TranslateErrorKind::InvalidRequest | TranslateErrorKind::MissingField => {
                GatewayError::InvalidRequest(e.message)
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
