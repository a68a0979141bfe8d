//! HTTP 服务器
//!
//! OpenAI 兼容的路由：
//!
//! - `GET /`, `GET /health`: 健康检查
//! - `POST /v1/chat/completions`
//! - `POST /v1/embeddings`
//! - `GET /v1/models`, `GET /v1/models/:id`

pub mod handlers;

use crate::config::ServerConfig;
use crate::processor::RequestProcessor;
use crate::server_utils::health_check;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<RequestProcessor>,
}

impl AppState {
    pub fn new(processor: RequestProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/v1/chat/completions", post(handlers::chat::chat_completions))
        .route("/v1/embeddings", post(handlers::embeddings::embeddings))
        .route("/v1/models", get(handlers::models::list_models))
        .route("/v1/models/:id", get(handlers::models::get_model))
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 运行服务器，`shutdown` 被取消后停止接受新连接并等待进行中的请求完成
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("[SERVER] 开始监听 http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!("[SERVER] 收到停止信号，等待进行中的请求完成");
        })
        .await
}

/// 等待停止信号后取消 `shutdown`
///
/// 信号注册失败时只记录错误，服务继续运行。
pub async fn cancel_on_signal<F, E>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    match signal.await {
        Ok(()) => shutdown.cancel(),
        Err(e) => tracing::error!("[SERVER] 监听停止信号失败，将无法通过信号停止: {}", e),
    }
}
