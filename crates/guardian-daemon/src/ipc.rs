//! IPC Server - Unix Domain Socket 通信
//!
//! 每行一个 JSON 方法调用，每行一个 JSON 回复。

use anyhow::Result;
use guardian_core::{BeaconService, MethodCall, Radio, Reply};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

pub async fn run_ipc_server<R: Radio + 'static>(
    path: PathBuf,
    service: Arc<BeaconService<R>>,
) -> Result<()> {
    // 删除旧的 socket 文件
    let _ = std::fs::remove_file(&path);

    let listener = UnixListener::bind(&path)?;
    tracing::info!("IPC server listening on {:?}", path);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, service).await {
                        tracing::warn!("Client connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                tracing::warn!("Failed to accept connection: {}", e);
            }
        }
    }
}

pub fn remove_socket(path: &Path) {
    if std::fs::remove_file(path).is_ok() {
        tracing::debug!("Removed socket {:?}", path);
    }
}

async fn handle_client<R: Radio + 'static>(
    stream: UnixStream,
    service: Arc<BeaconService<R>>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let reply = match serde_json::from_str::<MethodCall>(&line) {
            Ok(call) => {
                tracing::debug!("Received call: {:?}", call);
                service.call(&call).await
            }
            Err(e) => Reply::Error {
                code: "INVALID_ARGUMENT".to_string(),
                message: format!("Invalid request: {}", e),
            },
        };

        writer
            .write_all(serde_json::to_string(&reply)?.as_bytes())
            .await?;
        writer.write_all(b"\n").await?;
        line.clear();
    }

    Ok(())
}
