//! PeerLink Daemon
//!
//! 节点进程，负责：
//! - HTTP 上传与下载代理接口
//! - 每个分享代码一个的文件监听器
//! - 收到 Ctrl-C 后关闭所有监听器

mod service;

use anyhow::Result;
use clap::Parser;
use peerlink_core::{LogLevel, Settings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "peerlinkd", version, about = "PeerLink - 局域网临时文件分享节点")]
struct Args {
    /// 配置文件路径 (默认: ~/.config/peerlink/settings.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// HTTP 监听地址
    #[arg(long)]
    host: Option<String>,
    /// HTTP 端口
    #[arg(short, long)]
    port: Option<u16>,
    /// 上传文件保存目录
    #[arg(short, long)]
    upload_dir: Option<PathBuf>,
    /// 日志级别 (error, warn, info, debug, trace)
    #[arg(short, long)]
    log_level: Option<LogLevel>,
}

impl Args {
    fn settings(&self) -> Settings {
        let mut settings = match &self.config {
            Some(path) => Settings::load_from(path),
            None => Settings::load(),
        };
        if let Some(host) = &self.host {
            settings.http_host = host.clone();
        }
        if let Some(port) = self.port {
            settings.http_port = port;
        }
        if let Some(dir) = &self.upload_dir {
            settings.upload_dir = dir.clone();
        }
        if let Some(level) = self.log_level {
            settings.log_level = level;
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = args.settings();

    // 桥接 log crate（peerlink-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    // 初始化日志，RUST_LOG 优先于配置
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.filter_directive())),
        )
        .try_init();

    tracing::info!("PeerLink Daemon starting...");

    service::run_service(settings).await
}
