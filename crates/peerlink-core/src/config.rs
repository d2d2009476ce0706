//! 节点配置和持久化
//!
//! 提供 HTTP 端口、上传目录、代码范围等设置的存储和读取。

use crate::logging::LogLevel;
use crate::share::{CodeRange, ServeOptions};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 节点设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP API 监听地址
    pub http_host: String,
    /// HTTP API 端口
    pub http_port: u16,
    /// 文件监听器绑定的地址
    pub bind_host: String,
    /// 下载代理连接本地文件服务器时使用的地址
    pub proxy_host: String,
    /// 上传文件的保存目录
    pub upload_dir: PathBuf,
    /// 分享代码（即端口）的下限
    pub code_min: u16,
    /// 分享代码的上限（含）
    pub code_max: u16,
    /// 单次上传请求体的最大字节数
    pub max_upload_bytes: usize,
    /// 向下载方写入时的空闲超时（秒）
    pub idle_timeout_secs: u64,
    /// 下载代理的连接超时（秒）
    pub connect_timeout_secs: u64,
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            bind_host: "0.0.0.0".to_string(),
            proxy_host: "127.0.0.1".to_string(),
            upload_dir: std::env::temp_dir().join("peerlink-uploads"),
            code_min: CodeRange::DYNAMIC.min,
            code_max: CodeRange::DYNAMIC.max,
            max_upload_bytes: 1024 * 1024 * 1024,
            idle_timeout_secs: 600,
            connect_timeout_secs: 10,
            log_level: LogLevel::Info,
        }
    }
}

impl Settings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("peerlink")
            .join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// 从指定路径加载设置，读取或解析失败时回退到默认值
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// 分享代码范围，上下限写反时自动交换
    pub fn code_range(&self) -> CodeRange {
        CodeRange::new(self.code_min, self.code_max)
    }

    /// 文件服务器参数
    pub fn serve_options(&self) -> ServeOptions {
        ServeOptions {
            bind_host: self.bind_host.clone(),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// HTTP API 监听地址，如 `0.0.0.0:8080`
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
