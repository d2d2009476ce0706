//! PeerLink CLI
//!
//! 命令行客户端：向节点上传文件，或通过分享代码接收文件

mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "peerlink", version, about = "PeerLink - 用短代码分享文件")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 上传文件并获取分享代码
    Send {
        /// 要分享的文件路径
        file: PathBuf,
        /// 节点 HTTP 地址
        #[arg(short, long, default_value = "http://localhost:8080")]
        server: String,
    },
    /// 直接连接分享节点接收文件
    Fetch {
        /// 分享代码
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        code: u16,
        /// 分享节点地址
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// 保存目录 (默认: ~/Downloads)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 连接超时时间 (秒)
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },
    /// 通过节点的 HTTP 下载接口接收文件
    Download {
        /// 分享代码
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        code: u16,
        /// 节点 HTTP 地址
        #[arg(short, long, default_value = "http://localhost:8080")]
        server: String,
        /// 保存目录 (默认: ~/Downloads)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn output_dir(output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Send { file, server } => {
            println!("📤 上传文件: {}", file.display());
            let code = client::upload(&server, &file).await?;
            println!("✅ 分享代码: {}", code);
        }
        Commands::Fetch {
            code,
            host,
            output,
            timeout,
        } => {
            let dir = output_dir(output);
            println!("📥 从 {}:{} 接收 (保存到: {})", host, code, dir.display());
            let (path, size) =
                client::fetch(&host, code, &dir, Duration::from_secs(timeout)).await?;
            println!("✅ 已保存 {} ({} 字节)", path.display(), size);
        }
        Commands::Download {
            code,
            server,
            output,
        } => {
            let dir = output_dir(output);
            println!("📥 通过 {} 下载代码 {}", server, code);
            let (path, size) = client::download(&server, code, &dir).await?;
            println!("✅ 已保存 {} ({} 字节)", path.display(), size);
        }
    }

    Ok(())
}
