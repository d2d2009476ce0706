//! 单个连接的文件发送
//!
//! 每个接入的下载方对应一个 `StreamSender`，互相之间没有任何协调：
//! 各自从头读取文件，出错只影响自己的连接。

use crate::share::protocol;
use crate::share::registry::Offer;
use log::{debug, info};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

/// 读写缓冲大小
pub const BUFFER_SIZE: usize = 1024 * 1024;

/// 每发送这么多字节强制刷新一次
const FLUSH_INTERVAL: u64 = 10 * 1024 * 1024;

/// 进度日志间隔
const PROGRESS_INTERVAL: u64 = 50 * 1024 * 1024;

const MIB: u64 = 1024 * 1024;

/// 向一个下载方发送文件
pub struct StreamSender {
    stream: TcpStream,
    offer: Arc<Offer>,
    idle_timeout: Duration,
}

impl StreamSender {
    pub fn new(stream: TcpStream, offer: Arc<Offer>, idle_timeout: Duration) -> Self {
        Self {
            stream,
            offer,
            idle_timeout,
        }
    }

    /// 发送头部和文件内容，返回发送的文件字节数
    pub async fn run(self) -> io::Result<u64> {
        let peer = self.stream.peer_addr().ok();
        // 大文件传输保持 Nagle 算法开启
        self.stream.set_nodelay(false)?;

        let sent = send_offer(self.stream, &self.offer, self.idle_timeout).await?;
        info!(
            "File '{}' ({}MB) sent to {}",
            self.offer.display_name,
            sent / MIB,
            peer.map_or_else(|| "unknown peer".to_string(), |p| p.to_string())
        );
        Ok(sent)
    }
}

/// 将头部行和文件内容写入 `writer`，完成后关闭写端
///
/// 每次写入都受 `idle_timeout` 限制，下载方长时间不读取时以 `TimedOut` 结束。
pub async fn send_offer<W>(writer: W, offer: &Offer, idle_timeout: Duration) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut file = File::open(&offer.stored_path).await?;
    let mut out = BufWriter::with_capacity(BUFFER_SIZE, writer);

    with_idle_timeout(idle_timeout, out.write_all(&protocol::encode_header(&offer.display_name)))
        .await?;
    with_idle_timeout(idle_timeout, out.flush()).await?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total: u64 = 0;
    let mut unflushed: u64 = 0;

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        with_idle_timeout(idle_timeout, out.write_all(&buffer[..n])).await?;

        let before = total;
        total += n as u64;
        unflushed += n as u64;

        if unflushed >= FLUSH_INTERVAL {
            with_idle_timeout(idle_timeout, out.flush()).await?;
            unflushed = 0;
        }
        if total / PROGRESS_INTERVAL > before / PROGRESS_INTERVAL {
            debug!("Sent {}MB of '{}'...", total / MIB, offer.display_name);
        }
    }

    with_idle_timeout(idle_timeout, out.flush()).await?;
    with_idle_timeout(idle_timeout, out.shutdown()).await?;
    Ok(total)
}

async fn with_idle_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "peer stalled"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn offer_for(path: PathBuf, name: &str) -> Offer {
        Offer {
            code: 50000,
            stored_path: path,
            display_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_offer_writes_header_then_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_hello.txt");
        let content: Vec<u8> = (0..3 * BUFFER_SIZE + 17).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &content).await.unwrap();

        let offer = offer_for(path, "hello.txt");
        let mut out = Vec::new();
        let sent = send_offer(&mut out, &offer, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(sent, content.len() as u64);
        let header = b"Filename: hello.txt\n";
        assert_eq!(&out[..header.len()], header);
        assert_eq!(&out[header.len()..], &content[..]);
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let offer = offer_for(PathBuf::from("/nonexistent/peerlink/file"), "gone");
        let mut out = Vec::new();
        let err = send_offer(&mut out, &offer, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_peer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        tokio::fs::write(&path, vec![7u8; 2 * BUFFER_SIZE]).await.unwrap();

        // 对端从不读取，管道很快写满
        let (writer, _reader) = tokio::io::duplex(64);
        let offer = offer_for(path, "big.bin");
        let err = send_offer(writer, &offer, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
