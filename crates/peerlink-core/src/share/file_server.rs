//! 单个分享代码的文件服务器
//!
//! 状态: 未绑定 → 监听中 → 已关闭
//!
//! - 以代码作为端口号绑定监听器，失败则直接关闭并退役该代码
//! - 监听期间不限数量地接受连接，每个连接交给独立任务中的 `StreamSender`
//! - 监听循环因任何原因退出后，从注册表中退役该代码

use crate::error::ShareError;
use crate::share::registry::PortRegistry;
use crate::share::sender::StreamSender;
use log::{debug, error, info, warn};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 文件服务器参数
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// 监听地址
    pub bind_host: String,
    /// 向下载方写入时的空闲超时
    pub idle_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// 为注册表中的分享启动监听
#[derive(Clone)]
pub struct FileServer {
    registry: Arc<PortRegistry>,
    options: ServeOptions,
}

impl FileServer {
    pub fn new(registry: Arc<PortRegistry>, options: ServeOptions) -> Self {
        Self { registry, options }
    }

    /// 在后台任务中运行，绑定失败只记录日志
    pub fn spawn(&self, code: u16) -> JoinHandle<()> {
        let server = self.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run(code).await {
                error!("Error starting file server on port {}: {}", code, e);
            }
        })
    }

    /// 绑定端口并持续接受连接，直到监听器被关闭
    pub async fn run(&self, code: u16) -> Result<(), ShareError> {
        let listener = match TcpListener::bind((self.options.bind_host.as_str(), code)).await {
            Ok(listener) => listener,
            Err(source) => {
                self.registry.retire(code).await;
                return Err(ShareError::Bind { code, source });
            }
        };

        let stop = CancellationToken::new();
        // 失败时映射要么已不存在，要么属于另一个监听器，都不能在这里退役
        let offer = self.registry.mark_serving(code, stop.clone()).await?;

        info!("Serving file '{}' on port {}", offer.display_name, code);

        loop {
            tokio::select! {
                () = stop.cancelled() => {
                    info!("Stopped file server on port {}", code);
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Client connected on port {}: {}", code, peer);
                        let sender = StreamSender::new(stream, offer.clone(), self.options.idle_timeout);
                        tokio::spawn(async move {
                            if let Err(e) = sender.run().await {
                                warn!("Error sending file to {}: {}", peer, e);
                            }
                        });
                    }
                    Err(e) if is_transient(&e) => {
                        warn!("Error accepting client connection on port {}: {}", code, e);
                    }
                    Err(e) => {
                        error!("Error accepting client connection on port {}: {}", code, e);
                        break;
                    }
                }
            }
        }

        drop(listener);
        self.registry.retire(code).await;
        Ok(())
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
