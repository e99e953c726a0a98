//! 权限后端
//!
//! - [`SimulatedPermissions`]：模拟移动平台的授权流程，测试和模拟后端使用
//! - [`HostPermissions`]：桌面 Linux，没有运行时权限对话框

use async_trait::async_trait;
use log::info;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Permission, PermissionProvider, PermissionStatus, PromptOutcome};
use crate::ble::SimPlatform;
use crate::error::BeaconError;

struct SimPermState {
    statuses: BTreeMap<Permission, PermissionStatus>,
    /// 弹窗时模拟用户的选择
    decisions: BTreeMap<Permission, bool>,
    /// 用户做出选择所需的时间
    prompt_delay: Duration,
    prompts: u32,
    settings_opened: u32,
}

fn lock(state: &Mutex<SimPermState>) -> MutexGuard<'_, SimPermState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 模拟的移动平台权限
///
/// - Android：四项权限都存在，弹窗结束后通过完成回调返回结果
/// - iOS：没有 SCAN/CONNECT，弹窗后没有回调，由网关延迟重新读取；
///   已经做出决定的权限不会再次询问
pub struct SimulatedPermissions {
    platform: SimPlatform,
    state: Arc<Mutex<SimPermState>>,
}

impl SimulatedPermissions {
    /// 所有权限都未询问过，模拟用户会全部同意
    pub fn for_platform(platform: SimPlatform) -> Self {
        let statuses = Permission::ALL
            .into_iter()
            .map(|p| {
                let status = match (platform, p) {
                    (
                        SimPlatform::Ios,
                        Permission::BluetoothScan | Permission::BluetoothConnect,
                    ) => PermissionStatus::NotApplicable,
                    _ => PermissionStatus::NotDetermined,
                };
                (p, status)
            })
            .collect();

        Self {
            platform,
            state: Arc::new(Mutex::new(SimPermState {
                statuses,
                decisions: Permission::ALL.into_iter().map(|p| (p, true)).collect(),
                prompt_delay: Duration::from_millis(200),
                prompts: 0,
                settings_opened: 0,
            })),
        }
    }

    /// 所有权限已经授予
    pub fn granted(platform: SimPlatform) -> Self {
        let sim = Self::for_platform(platform);
        {
            let mut state = lock(&sim.state);
            for status in state.statuses.values_mut() {
                if *status != PermissionStatus::NotApplicable {
                    *status = PermissionStatus::Granted;
                }
            }
        }
        sim
    }

    pub fn set_status(&self, permission: Permission, status: PermissionStatus) {
        lock(&self.state).statuses.insert(permission, status);
    }

    pub fn decide(&self, permission: Permission, grant: bool) {
        lock(&self.state).decisions.insert(permission, grant);
    }

    pub fn decide_all(&self, grant: bool) {
        for p in Permission::ALL {
            self.decide(p, grant);
        }
    }

    pub fn set_prompt_delay(&self, delay: Duration) {
        lock(&self.state).prompt_delay = delay;
    }

    /// 弹窗次数
    pub fn prompts(&self) -> u32 {
        lock(&self.state).prompts
    }

    pub fn settings_opened(&self) -> u32 {
        lock(&self.state).settings_opened
    }

    fn apply(
        platform: SimPlatform,
        state: &Mutex<SimPermState>,
        permissions: &[Permission],
    ) -> BTreeMap<Permission, bool> {
        let mut state = lock(state);
        let mut results = BTreeMap::new();
        for &p in permissions {
            let current = state
                .statuses
                .get(&p)
                .copied()
                .unwrap_or(PermissionStatus::NotDetermined);
            let next = match (platform, current) {
                (_, PermissionStatus::NotApplicable) => current,
                (SimPlatform::Ios, PermissionStatus::Granted | PermissionStatus::Denied) => current,
                _ => {
                    if state.decisions.get(&p).copied().unwrap_or(false) {
                        PermissionStatus::Granted
                    } else {
                        PermissionStatus::Denied
                    }
                }
            };
            state.statuses.insert(p, next);
            results.insert(p, next.is_satisfied());
        }
        results
    }
}

#[async_trait]
impl PermissionProvider for SimulatedPermissions {
    fn status(&self, permission: Permission) -> PermissionStatus {
        lock(&self.state)
            .statuses
            .get(&permission)
            .copied()
            .unwrap_or(PermissionStatus::NotDetermined)
    }

    async fn prompt(&self, permissions: &[Permission]) -> Result<PromptOutcome, BeaconError> {
        let delay = {
            let mut state = lock(&self.state);
            state.prompts += 1;
            state.prompt_delay
        };

        match self.platform {
            SimPlatform::Android => {
                tokio::time::sleep(delay).await;
                let results = Self::apply(self.platform, &self.state, permissions);
                Ok(PromptOutcome::Completed(results))
            }
            SimPlatform::Ios => {
                let platform = self.platform;
                let state = self.state.clone();
                let permissions = permissions.to_vec();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    Self::apply(platform, &state, &permissions);
                });
                Ok(PromptOutcome::Deferred)
            }
        }
    }

    fn open_settings(&self) {
        info!("Simulated: opening app permission settings");
        lock(&self.state).settings_opened += 1;
    }
}

/// 桌面 Linux：BlueZ 通过 D-Bus 策略控制访问，没有逐应用的运行时权限
pub struct HostPermissions;

#[async_trait]
impl PermissionProvider for HostPermissions {
    fn status(&self, _permission: Permission) -> PermissionStatus {
        PermissionStatus::NotApplicable
    }

    async fn prompt(&self, _permissions: &[Permission]) -> Result<PromptOutcome, BeaconError> {
        Ok(PromptOutcome::Completed(BTreeMap::new()))
    }

    fn open_settings(&self) {
        info!("No per-application permission settings on this host");
    }
}
