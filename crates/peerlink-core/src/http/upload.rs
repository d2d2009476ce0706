//! 上传处理器
//!
//! 解析上传的文件，保存到上传目录，登记分享代码并在后台启动文件服务器。
//! 响应不等待监听器绑定完成。

use crate::http::{ApiError, AppState};
use crate::multipart;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, header},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// 文件名为空时使用的显示名称
pub const UNNAMED_FILE: &str = "unnamed-file";

/// 大多数文件系统的单个文件名长度上限（字节）
const MAX_FILE_NAME_BYTES: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub port: u16,
}

pub async fn handle(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    if method != Method::POST {
        return Err(ApiError::MethodNotAllowed);
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        return Err(ApiError::BadRequest(
            "Content-Type must be multipart/form-data".to_string(),
        ));
    }
    let boundary = multipart::boundary_from_content_type(content_type)
        .ok_or_else(|| ApiError::BadRequest("Missing multipart boundary".to_string()))?;

    let file = multipart::extract(&body, boundary)?;
    let display_name = display_name(&file.filename);
    let stored_path = state.upload_dir.join(stored_file_name(&display_name));

    tokio::fs::write(&stored_path, &file.content)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to store upload: {e}")))?;

    let code = match state.registry.offer(&stored_path, &display_name).await {
        Ok(code) => code,
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(&stored_path).await {
                warn!("Failed to remove unregistered upload: {}", rm);
            }
            return Err(ApiError::Internal(e.to_string()));
        }
    };

    info!(
        "Received '{}' ({} bytes, {}), offering on port {}",
        display_name,
        file.content.len(),
        file.content_type,
        code
    );
    state.file_server.spawn(code);

    Ok(Json(UploadResponse { port: code }))
}

/// 提取用于显示的文件名：只保留最后一个路径分量，空白时使用默认名称
pub fn display_name(raw: &str) -> String {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() {
        UNNAMED_FILE.to_string()
    } else {
        name.to_string()
    }
}

/// 拆分主文件名和扩展名（扩展名包含 `.`）
///
/// 以 `.` 开头或结尾的名称视为没有扩展名。
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx < name.len() - 1 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// 生成磁盘上的唯一文件名 `<uuid>_<主文件名><扩展名>`
///
/// 过长的主文件名会被截断，扩展名保持不变。
pub fn stored_file_name(display_name: &str) -> String {
    let prefix = uuid::Uuid::new_v4().to_string();
    let (base, ext) = split_extension(display_name);

    let budget = MAX_FILE_NAME_BYTES.saturating_sub(prefix.len() + 1 + ext.len());
    let mut end = base.len().min(budget);
    while !base.is_char_boundary(end) {
        end -= 1;
    }

    format!("{prefix}_{}{ext}", &base[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("hello.txt"), "hello.txt");
        assert_eq!(display_name("  spaced.txt "), "spaced.txt");
        assert_eq!(display_name("C:\\Users\\me\\report.pdf"), "report.pdf");
        assert_eq!(display_name("../../etc/passwd"), "passwd");
        assert_eq!(display_name("   "), UNNAMED_FILE);
        assert_eq!(display_name(""), UNNAMED_FILE);
        assert_eq!(display_name("dir/"), UNNAMED_FILE);
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
        assert_eq!(split_extension("trailing."), ("trailing.", ""));
    }

    #[test]
    fn test_stored_file_name_is_unique() {
        let a = stored_file_name("hello.txt");
        let b = stored_file_name("hello.txt");

        assert_ne!(a, b);
        assert!(a.ends_with("_hello.txt"));
        // uuid v4 文本形式为 36 个字符
        assert_eq!(a.len(), 36 + 1 + "hello.txt".len());
    }

    #[test]
    fn test_stored_file_name_truncates_long_base() {
        let long = format!("{}.mp4", "é".repeat(300));
        let name = stored_file_name(&long);

        assert!(name.len() <= MAX_FILE_NAME_BYTES);
        assert!(name.ends_with(".mp4"));
    }
}
