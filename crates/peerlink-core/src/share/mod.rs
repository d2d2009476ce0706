//! 临时文件分享
//!
//! 包含:
//! - 分享代码注册表
//! - 每个代码一个的文件服务器
//! - 每个连接一个的文件发送器
//! - 点对点传输协议

pub mod file_server;
pub mod protocol;
pub mod registry;
pub mod sender;

pub use file_server::{FileServer, ServeOptions};
pub use protocol::PeerStream;
pub use registry::{CodeRange, Offer, OfferState, PortRegistry};
pub use sender::StreamSender;
