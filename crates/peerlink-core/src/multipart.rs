//! multipart/form-data 单文件提取
//!
//! 上传接口每个请求只接受一个文件字段，因此这里不实现完整的 RFC 7578
//! 解析器，而是直接在已缓冲的请求体里定位文件名、内容类型和内容范围。
//!
//! # 格式
//!
//! ```text
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="file"; filename="hello.txt"\r\n
//! Content-Type: text/plain\r\n
//! \r\n
//! <raw bytes>\r\n
//! --<boundary>--\r\n
//! ```

use axum::body::Bytes;
use thiserror::Error;

/// 未声明内容类型时的默认值
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const FILENAME_MARKER: &[u8] = b"filename=\"";
const CONTENT_TYPE_MARKER: &[u8] = b"content-type:";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// 请求体解析失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MultipartError {
    #[error("missing filename")]
    MissingFilename,
    #[error("unterminated filename")]
    UnterminatedFilename,
    #[error("missing part header terminator")]
    MissingHeaderEnd,
    #[error("missing closing boundary")]
    MissingBoundary,
    #[error("empty file content")]
    EmptyContent,
}

/// 从请求体中提取出的文件
#[derive(Debug, Clone)]
pub struct MultipartFile {
    pub filename: String,
    pub content_type: String,
    pub content: Bytes,
}

/// 从 `Content-Type` 头中取出 multipart boundary
///
/// 媒体类型不是 `multipart/form-data` 或缺少 boundary 参数时返回 `None`。
pub fn boundary_from_content_type(content_type: &str) -> Option<&str> {
    let mut params = content_type.split(';');
    let media_type = params.next()?.trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }

    params.find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then_some(value)
    })
}

/// 提取请求体中的第一个文件字段
///
/// 先查找结束分隔符 `\r\n--<boundary>--`，找不到再退回到普通分隔符
/// `\r\n--<boundary>`，部分客户端不会发送结尾的 `--`。
pub fn extract(body: &[u8], boundary: &str) -> Result<MultipartFile, MultipartError> {
    let filename_start = find(body, FILENAME_MARKER, 0).ok_or(MultipartError::MissingFilename)?
        + FILENAME_MARKER.len();
    let filename_end =
        find(body, b"\"", filename_start).ok_or(MultipartError::UnterminatedFilename)?;
    let filename = String::from_utf8_lossy(&body[filename_start..filename_end]).into_owned();

    let header_end = find(body, HEADER_END, filename_end).ok_or(MultipartError::MissingHeaderEnd)?;
    let content_type = part_content_type(&body[filename_end..header_end])
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let content_start = header_end + HEADER_END.len();
    let terminal = format!("\r\n--{boundary}--");
    let delimiter = format!("\r\n--{boundary}");
    let content_end = find(body, terminal.as_bytes(), content_start)
        .or_else(|| find(body, delimiter.as_bytes(), content_start))
        .ok_or(MultipartError::MissingBoundary)?;

    if content_end <= content_start {
        return Err(MultipartError::EmptyContent);
    }

    Ok(MultipartFile {
        filename,
        content_type,
        content: Bytes::copy_from_slice(&body[content_start..content_end]),
    })
}

/// 在分段头里查找 `Content-Type`（忽略大小写），值截止到下一个 CRLF
fn part_content_type(headers: &[u8]) -> Option<String> {
    let start = headers
        .windows(CONTENT_TYPE_MARKER.len())
        .position(|w| w.eq_ignore_ascii_case(CONTENT_TYPE_MARKER))?
        + CONTENT_TYPE_MARKER.len();
    let end = find(headers, b"\r\n", start).unwrap_or(headers.len());
    let value = String::from_utf8_lossy(&headers[start..end]).trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}
