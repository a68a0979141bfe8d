//! 服务器工具函数
//!
//! 健康检查、SSE 响应构建与请求体解析错误转换。

use crate::processor::GatewayError;
use crate::stream::SseStream;
use axum::{
    body::Body,
    extract::rejection::JsonRejection,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use std::convert::Infallible;

/// 健康检查
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 构建 SSE 响应，每个事件单独写出
pub fn sse_response(stream: SseStream) -> Response {
    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .unwrap_or_else(|e| {
            tracing::error!("[SERVER] 构建 SSE 响应失败: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

/// 请求体无法解析时返回 OpenAI 风格的 400
pub fn invalid_body(rejection: JsonRejection) -> GatewayError {
    tracing::warn!("[SERVER] 请求体解析失败: {}", rejection.body_text());
    GatewayError::InvalidRequest(rejection.body_text())
}
