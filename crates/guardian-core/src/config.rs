//! 应用配置和持久化
//!
//! 设置保存在 `~/.config/guardian-beacon/settings.toml`。

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ble::{SessionOptions, SimPlatform, TransitionPolicy, UserIdPolicy};
use crate::permission::{GateOptions, OverlapPolicy};

/// 广播后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// 内存中的模拟无线电
    #[default]
    Simulated,
    /// BlueZ (需要 `bluez` feature)
    Bluez,
}

/// 应用设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconSettings {
    /// `startAdvertising` 未提供 userId 时使用
    pub default_user_id: u16,
    pub user_id_policy: UserIdPolicy,
    pub transition: TransitionPolicy,
    /// 权限请求超时 (秒)
    pub request_timeout_secs: u64,
    /// 无完成回调的平台，弹窗后重新读取前的等待 (毫秒)
    pub permission_settle_ms: u64,
    pub overlap: OverlapPolicy,
    pub backend: Backend,
    /// 模拟后端扮演的平台
    pub sim_platform: SimPlatform,
    /// BlueZ 适配器名称 (如 hci0)，为空时使用默认适配器
    pub adapter: Option<String>,
    /// 守护进程 socket 路径，为空时使用运行时目录
    pub socket_path: Option<PathBuf>,
}

impl Default for BeaconSettings {
    fn default() -> Self {
        Self {
            default_user_id: 3,
            user_id_policy: UserIdPolicy::Truncate,
            transition: TransitionPolicy::Optimistic,
            request_timeout_secs: 30,
            permission_settle_ms: 1000,
            overlap: OverlapPolicy::Coalesce,
            backend: Backend::Simulated,
            sim_platform: SimPlatform::Android,
            adapter: None,
            socket_path: None,
        }
    }
}

impl BeaconSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("guardian-beacon")
            .join("settings.toml")
    }

    /// 加载设置（如果文件不存在或无法解析则使用默认值）
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    warn!("Failed to read settings file: {}, using defaults", e);
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

    /// 守护进程 socket 路径
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path.clone().unwrap_or_else(default_socket_path)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            transition: self.transition,
        }
    }

    pub fn gate_options(&self) -> GateOptions {
        GateOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            settle_delay: Duration::from_millis(self.permission_settle_ms),
            overlap: self.overlap,
        }
    }
}

/// `$XDG_RUNTIME_DIR/guardian-beacon.sock`，没有运行时目录时放在 /tmp
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("guardian-beacon.sock")
}
