//! 文件共享子系统的错误类型

use std::io;
use thiserror::Error;

/// 共享注册表与文件服务器的错误
#[derive(Debug, Error)]
pub enum ShareError {
    /// 代码空间已全部被占用
    #[error("no free code left in {min}..={max}")]
    CodeSpaceExhausted { min: u16, max: u16 },

    #[error("code {0} is not registered")]
    UnknownCode(u16),

    #[error("code {0} is already being served")]
    AlreadyServing(u16),

    /// 监听端口绑定失败（端口被占用或需要特权）
    #[error("failed to bind port {code}: {source}")]
    Bind {
        code: u16,
        #[source]
        source: io::Error,
    },

    /// 传输过程中的磁盘或套接字错误
    #[error("transfer failed: {0}")]
    Transfer(#[from] io::Error),
}
