//! 节点客户端 - 上传、直连接收与 HTTP 下载

use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use peerlink_core::UploadResponse;
use peerlink_core::share::PeerStream;
use peerlink_core::share::protocol::DEFAULT_FILENAME;
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// 上传文件，返回分享代码
pub async fn upload(server: &str, path: &Path) -> Result<u16> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("path has no file name")?;
    let file = File::open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    let len = file.metadata().await?.len();

    let part = Part::stream_with_length(reqwest::Body::from(file), len).file_name(name);
    let form = Form::new().part("file", part);

    let url = format!("{}/upload", server.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("cannot reach {url}"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("upload failed ({}): {}", status, response.text().await?);
    }
    let body: UploadResponse = response.json().await?;
    Ok(body.port)
}

/// 直接用传输协议连接对端并保存文件
pub async fn fetch(
    host: &str,
    code: u16,
    output_dir: &Path,
    timeout: Duration,
) -> Result<(PathBuf, u64)> {
    let peer = PeerStream::connect(host, code, timeout)
        .await
        .with_context(|| format!("cannot connect to {host}:{code}"))?;

    let target = output_dir.join(local_file_name(&peer.filename));
    let mut file = File::create(&target).await?;
    let written = peer.copy_to(&mut file).await?;
    file.flush().await?;

    Ok((target, written))
}

/// 通过节点的 HTTP 下载代理保存文件
pub async fn download(server: &str, code: u16, output_dir: &Path) -> Result<(PathBuf, u64)> {
    let url = format!("{}/download/{}", server.trim_end_matches('/'), code);
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("cannot reach {url}"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("download failed ({}): {}", status, response.text().await?);
    }

    let name = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_filename)
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    let target = output_dir.join(local_file_name(&name));
    let mut file = File::create(&target).await?;
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok((target, written))
}

/// 对端提供的文件名只保留最后一个路径分量
fn local_file_name(advertised: &str) -> String {
    let name = advertised.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match name {
        "" | "." | ".." => DEFAULT_FILENAME.to_string(),
        name => name.to_string(),
    }
}

/// 取出 `Content-Disposition` 中的 `filename="..."`
fn disposition_filename(value: &str) -> Option<String> {
    let start = value.find("filename=\"")? + "filename=\"".len();
    let end = value[start..].find('"')? + start;
    Some(value[start..end].to_string())
}
