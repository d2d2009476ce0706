//! 下载代理
//!
//! 浏览器不会说原始传输协议，这里作为 TCP 客户端连接本地文件服务器，
//! 读取头部后把剩余字节原样转发为 HTTP 响应体（不经过临时文件）。

use crate::http::{ApiError, AppState};
use crate::share::PeerStream;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{Method, header},
    response::{IntoResponse, Response},
};
use log::info;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::io;
use tokio_util::io::ReaderStream;

/// RFC 5987 `attr-char` 之外的字符都需要编码
const ATTR_CHAR_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

pub async fn handle(
    State(state): State<AppState>,
    method: Method,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    if method != Method::GET {
        return Err(ApiError::MethodNotAllowed);
    }

    let code: u16 = code
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid port number".to_string()))?;

    // 未登记的代码与连接失败一样处理，不去连接任意本地端口
    if state.registry.lookup(code).await.is_none() {
        return Err(ApiError::Proxy(io::Error::from(
            io::ErrorKind::ConnectionRefused,
        )));
    }

    let peer = PeerStream::connect(&state.proxy_host, code, state.connect_timeout)
        .await
        .map_err(ApiError::Proxy)?;

    info!("Relaying '{}' from port {}", peer.filename, code);

    let content_type = mime_guess::from_path(&peer.filename)
        .first_or_octet_stream()
        .to_string();
    let disposition = content_disposition(&peer.filename);
    let body = Body::from_stream(ReaderStream::new(peer.reader));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// 构造 `Content-Disposition` 头
///
/// `filename` 只保留可打印 ASCII，其余字符替换为 `_`；完整名称放在
/// 百分号编码的 `filename*` 中。
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    let encoded = utf8_percent_encode(filename, ATTR_CHAR_ENCODE_SET);
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
