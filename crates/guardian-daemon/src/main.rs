//! Guardian Beacon Daemon
//!
//! 后台守护进程，负责：
//! - 持有唯一的广播会话
//! - 转发平台回调 (广播启动结果、适配器开关)
//! - 通过 Unix Socket 接收命令

mod ipc;
mod service;

use anyhow::Result;
use guardian_core::BeaconSettings;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 桥接 log crate（guardian-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,guardian_core=debug")),
        )
        .try_init();

    tracing::info!("Guardian beacon daemon starting...");

    let settings = BeaconSettings::load();
    tracing::debug!("Settings: {:?}", settings);

    service::run(settings).await
}
