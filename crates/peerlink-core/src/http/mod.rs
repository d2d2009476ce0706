//! HTTP API 服务器
//!
//! # 路由
//!
//! - `POST /upload`：上传单个文件，返回 `{"port": <code>}`
//! - `GET /download/:code`：通过本地文件服务器下载文件
//! - 任意路径的 `OPTIONS`：CORS 预检，返回 204
//!
//! 所有响应都带有开放的 CORS 头。

pub mod download;
pub mod upload;

pub use upload::UploadResponse;

use crate::config::Settings;
use crate::multipart::MultipartError;
use crate::share::{FileServer, PortRegistry};
use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
};
use log::{error, info};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;

/// 请求处理器共享的状态
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PortRegistry>,
    pub file_server: FileServer,
    pub upload_dir: PathBuf,
    pub proxy_host: String,
    pub connect_timeout: Duration,
}

/// API 错误，转换为对应的 HTTP 状态码和纯文本消息
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Bad Request: Could not parse file content ({0})")]
    MalformedBody(#[from] MultipartError),

    /// 连接或读取本地文件服务器失败（不区分代码不存在、已退役和网络错误）
    #[error("Error downloading file: {0}")]
    Proxy(#[source] io::Error),

    #[error("Server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) | ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Proxy(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

/// 构建路由
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload", any(upload::handle))
        .route("/download/:code", any(download::handle))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// 预检请求直接返回 204，其余响应补上 CORS 头
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type,Authorization"),
    );
    response
}

/// API 服务器
pub struct ApiServer {
    settings: Settings,
    registry: Arc<PortRegistry>,
    port: u16,
}

impl ApiServer {
    pub fn new(settings: Settings) -> Self {
        let registry = Arc::new(PortRegistry::new(settings.code_range()));
        Self {
            settings,
            registry,
            port: 0,
        }
    }

    /// 获取实际监听的端口（启动前为 0）
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn registry(&self) -> Arc<PortRegistry> {
        self.registry.clone()
    }

    fn state(&self) -> AppState {
        AppState {
            registry: self.registry.clone(),
            file_server: FileServer::new(self.registry.clone(), self.settings.serve_options()),
            upload_dir: self.settings.upload_dir.clone(),
            proxy_host: self.settings.proxy_host.clone(),
            connect_timeout: self.settings.connect_timeout(),
        }
    }

    /// 创建上传目录并绑定 HTTP 端口
    async fn bind(&mut self) -> anyhow::Result<TcpListener> {
        tokio::fs::create_dir_all(&self.settings.upload_dir).await?;

        let listener = TcpListener::bind(self.settings.http_addr()).await?;
        self.port = listener.local_addr()?.port();
        info!("API server started on port {}", self.port);
        Ok(listener)
    }

    /// 在后台启动服务器，返回端口
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = self.bind().await?;
        let app = router(self.state(), self.settings.max_upload_bytes);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("API server error: {}", e);
            }
        });

        Ok(self.port)
    }

    /// 运行服务器直到 `shutdown` 完成，然后关闭所有文件服务器
    pub async fn serve<F>(&mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        let app = router(self.state(), self.settings.max_upload_bytes);

        let registry = self.registry.clone();
        let shutdown = async move {
            shutdown.await;
            info!("Shutting down, closing {} active offers", registry.len().await);
            registry.shutdown().await;
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status() {
        assert_eq!(
            ApiError::MethodNotAllowed.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ApiError::from(MultipartError::MissingFilename).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Proxy(io::Error::from(io::ErrorKind::ConnectionRefused)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ApiError::from(MultipartError::MissingFilename).to_string(),
            "Bad Request: Could not parse file content (missing filename)"
        );
        assert_eq!(
            ApiError::Internal("disk full".into()).to_string(),
            "Server error: disk full"
        );
    }
}
