//! 运行时权限
//!
//! 广播需要四项权限：`BLUETOOTH_SCAN`、`BLUETOOTH_CONNECT`、
//! `BLUETOOTH_ADVERTISE`、`ACCESS_FINE_LOCATION`。
//! 平台没有对应概念的权限视为始终可用。

pub mod gate;
pub mod sim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::BeaconError;

pub use gate::{GateOptions, OverlapPolicy, PermissionGate};
pub use sim::{HostPermissions, SimulatedPermissions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "BLUETOOTH_SCAN")]
    BluetoothScan,
    #[serde(rename = "BLUETOOTH_CONNECT")]
    BluetoothConnect,
    #[serde(rename = "BLUETOOTH_ADVERTISE")]
    BluetoothAdvertise,
    #[serde(rename = "ACCESS_FINE_LOCATION")]
    AccessFineLocation,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::BluetoothScan,
        Permission::BluetoothConnect,
        Permission::BluetoothAdvertise,
        Permission::AccessFineLocation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Permission::BluetoothScan => "BLUETOOTH_SCAN",
            Permission::BluetoothConnect => "BLUETOOTH_CONNECT",
            Permission::BluetoothAdvertise => "BLUETOOTH_ADVERTISE",
            Permission::AccessFineLocation => "ACCESS_FINE_LOCATION",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 单项权限的授权状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// 尚未询问过用户
    NotDetermined,
    /// 当前平台没有这项权限
    NotApplicable,
}

impl PermissionStatus {
    pub fn is_satisfied(self) -> bool {
        matches!(self, PermissionStatus::Granted | PermissionStatus::NotApplicable)
    }
}

/// 四项权限的授权快照，总是包含全部四个键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<Permission, bool>",
    into = "BTreeMap<Permission, bool>"
)]
pub struct PermissionSet(BTreeMap<Permission, bool>);

impl PermissionSet {
    pub fn from_fn(mut granted: impl FnMut(Permission) -> bool) -> Self {
        Self(Permission::ALL.into_iter().map(|p| (p, granted(p))).collect())
    }

    pub fn get(&self, permission: Permission) -> bool {
        self.0.get(&permission).copied().unwrap_or(false)
    }

    pub fn set(&mut self, permission: Permission, granted: bool) {
        self.0.insert(permission, granted);
    }

    pub fn all_granted(&self) -> bool {
        self.0.values().all(|&g| g)
    }

    pub fn missing(&self) -> Vec<Permission> {
        self.0
            .iter()
            .filter(|&(_, &granted)| !granted)
            .map(|(&p, _)| p)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Permission, bool)> + '_ {
        self.0.iter().map(|(&p, &g)| (p, g))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 缺少的键按未授权补齐
impl From<BTreeMap<Permission, bool>> for PermissionSet {
    fn from(map: BTreeMap<Permission, bool>) -> Self {
        Self::from_fn(|p| map.get(&p).copied().unwrap_or(false))
    }
}

impl From<PermissionSet> for BTreeMap<Permission, bool> {
    fn from(set: PermissionSet) -> Self {
        set.0
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(p, g)| format!("{}={}", p, g))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// 系统权限对话框的结束方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// 平台提供了完成回调，结果可能只包含被请求的权限
    Completed(BTreeMap<Permission, bool>),
    /// 平台没有完成回调，需要稍后重新读取状态
    Deferred,
}

/// 平台权限接口
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// 同步读取当前状态，不会弹出任何界面
    fn status(&self, permission: Permission) -> PermissionStatus;

    /// 弹出系统授权对话框
    async fn prompt(&self, permissions: &[Permission]) -> Result<PromptOutcome, BeaconError>;

    /// 跳转到系统的应用权限设置页
    fn open_settings(&self);
}
