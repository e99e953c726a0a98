//! IPC Client - 与守护进程通信

use anyhow::Result;
use guardian_core::{MethodCall, Reply};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub async fn send_request(path: &Path, call: &MethodCall) -> Result<Reply> {
    let stream = match UnixStream::connect(path).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ 无法连接到守护进程 ({}): {}", path.display(), e);
            eprintln!("   请确保 guardian-daemon 正在运行");
            eprintln!("   运行: cargo xtask dev");
            return Err(e.into());
        }
    };

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // 发送请求
    let json = serde_json::to_string(call)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    // 读取回复
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        anyhow::bail!("daemon closed the connection without replying");
    }

    Ok(serde_json::from_str(&line)?)
}
