//! PeerLink Core Library
//!
//! 上传文件后获得一个短数字代码，任何连接到以该代码为端口号的节点的对端，
//! 都会收到文件名头部和文件原始字节。
//!
//! # 模块
//!
//! - **multipart**: 单文件 multipart/form-data 提取
//! - **share**: 分享代码注册表、文件服务器和传输协议
//! - **http**: 上传接口与下载代理
//! - **config**: 节点设置
//!
//! # 使用示例
//!
//! ## 启动节点
//!
//! ```ignore
//! use peerlink_core::{ApiServer, Settings};
//!
//! let mut server = ApiServer::new(Settings::load());
//! server.serve(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```
//!
//! ## 直接接收文件
//!
//! ```ignore
//! use peerlink_core::share::PeerStream;
//!
//! let peer = PeerStream::connect("192.168.1.20", 51234, Duration::from_secs(10)).await?;
//! let mut file = tokio::fs::File::create(&peer.filename).await?;
//! peer.copy_to(&mut file).await?;
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod multipart;
pub mod share;

pub use config::Settings;
pub use error::ShareError;
pub use http::{ApiError, ApiServer, UploadResponse};
pub use logging::LogLevel;
pub use multipart::{MultipartError, MultipartFile};
pub use share::{
    CodeRange, FileServer, Offer, OfferState, PeerStream, PortRegistry, ServeOptions,
    StreamSender,
};
