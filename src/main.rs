use anyhow::Context;
use bridgecast_lib::server::{self, AppState};
use bridgecast_lib::{logger, GatewayConfig, RequestProcessor};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();

    let config = GatewayConfig::load()?;
    logger::init_tracing(&config.logging);
    tracing::info!("[MAIN] bridgecast {} 启动", env!("CARGO_PKG_VERSION"));
    tracing::debug!("[MAIN] 后端配置: {:?}", config.backend);

    let processor = RequestProcessor::from_config(&config)?;
    let router = server::build_router(AppState::new(processor), &config.server);

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {}", addr))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(server::cancel_on_signal(
        tokio::signal::ctrl_c(),
        shutdown.clone(),
    ));

    server::serve(listener, router, shutdown).await?;
    tracing::info!("[MAIN] 已停止");
    Ok(())
}
