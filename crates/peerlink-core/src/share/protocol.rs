//! 点对点传输协议
//!
//! 服务端在连接建立后先写入一行头部，再写入文件原始字节，关闭连接即表示结束:
//!
//! ```text
//! Filename: <name>\n
//! <raw bytes ...>
//! ```
//!
//! 没有长度前缀、校验和或版本协商。名称本身不做转义，包含 `\n` 的文件名会
//! 破坏分帧。

use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpStream;

pub const HEADER_PREFIX: &str = "Filename: ";

/// 头部缺失或格式不对时使用的文件名
pub const DEFAULT_FILENAME: &str = "downloaded-file";

/// 头部行的最大长度（含换行符）
pub const MAX_HEADER_LEN: u64 = 4096;

/// 编码头部行
pub fn encode_header(display_name: &str) -> Vec<u8> {
    format!("{HEADER_PREFIX}{display_name}\n").into_bytes()
}

/// 解析头部行，忽略 `\r` 和首尾空白
pub fn parse_header(line: &[u8]) -> Option<String> {
    let line: Vec<u8> = line.iter().copied().filter(|&b| b != b'\r').collect();
    let line = String::from_utf8_lossy(&line);
    let name = line.trim().strip_prefix(HEADER_PREFIX)?;
    Some(name.to_string())
}

/// 从流中读取头部行（截止到第一个 `\n`）
///
/// 流在换行之前结束时，已读到的内容仍作为头部处理。
pub async fn read_header<R>(reader: &mut BufReader<R>) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    (&mut *reader)
        .take(MAX_HEADER_LEN)
        .read_until(b'\n', &mut line)
        .await?;
    if line.len() as u64 >= MAX_HEADER_LEN && line.last() != Some(&b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "header line too long",
        ));
    }
    Ok(parse_header(&line))
}

/// 已读完头部、正在接收文件内容的连接
pub struct PeerStream {
    pub filename: String,
    pub reader: BufReader<TcpStream>,
}

impl PeerStream {
    /// 连接文件服务器并读取头部
    ///
    /// `timeout` 分别限制建立连接和等待头部的时间，对端接受连接却不发送数据时
    /// 不会一直等待。
    pub async fn connect(host: &str, code: u16, timeout: Duration) -> io::Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, code)))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connection timed out"))??;

        let mut reader = BufReader::new(stream);
        let filename = tokio::time::timeout(timeout, read_header(&mut reader))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no header received"))??
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

        Ok(Self { filename, reader })
    }

    /// 将剩余内容全部写入 `writer`，返回字节数
    pub async fn copy_to<W>(mut self, writer: &mut W) -> io::Result<u64>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        tokio::io::copy_buf(&mut self.reader, writer).await
    }
}
