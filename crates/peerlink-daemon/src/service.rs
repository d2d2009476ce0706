//! Core Service - API 服务器与文件监听器生命周期

use anyhow::{Context, Result};
use peerlink_core::{ApiServer, Settings};

pub async fn run_service(settings: Settings) -> Result<()> {
    tracing::info!("Upload directory: {}", settings.upload_dir.display());
    tracing::info!(
        "Share codes: {}..={}",
        settings.code_range().min,
        settings.code_range().max
    );

    let addr = settings.http_addr();
    let mut server = ApiServer::new(settings);

    // 只有主 HTTP 端口绑定失败是致命错误
    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down server...");
        })
        .await
        .with_context(|| format!("API server on {addr} failed"))
}
