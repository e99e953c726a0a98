//! 权限网关
//!
//! - `snapshot()`：同步读取四项权限，不弹窗
//! - `request()`：为未授权的权限弹出系统对话框，等待平台给出最终结果
//!
//! 同一时刻只有一个请求在进行。重叠的 `request()` 按 [`OverlapPolicy`]
//! 处理：合并 (所有调用方等待同一个结果) 或拒绝。
//! 每个请求都有超时，系统对话框可能一直不关闭。

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Permission, PermissionProvider, PermissionSet, PromptOutcome};
use crate::error::BeaconError;

type SharedResult = Shared<BoxFuture<'static, Result<PermissionSet, BeaconError>>>;

/// 正在进行的请求；后台任务结束时按 `id` 清空槽位
struct InFlight {
    id: u64,
    result: SharedResult,
}

type Slot = Arc<Mutex<Option<InFlight>>>;

/// 重叠请求的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// 后来的调用方加入正在进行的请求，拿到同一个结果
    #[default]
    Coalesce,
    /// 后来的调用方立即得到 [`BeaconError::RequestRejected`]
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOptions {
    pub request_timeout: Duration,
    /// 没有完成回调的平台，弹窗后等待多久再重新读取
    pub settle_delay: Duration,
    pub overlap: OverlapPolicy,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(1),
            overlap: OverlapPolicy::Coalesce,
        }
    }
}

pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
    options: GateOptions,
    in_flight: Slot,
    next_id: AtomicU64,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn PermissionProvider>, options: GateOptions) -> Self {
        Self {
            provider,
            options,
            in_flight: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn options(&self) -> GateOptions {
        self.options
    }

    /// 当前授权状态
    pub fn snapshot(&self) -> PermissionSet {
        snapshot_of(self.provider.as_ref())
    }

    /// 权限未授予时返回 [`BeaconError::PermissionDenied`]
    pub fn ensure(&self, permission: Permission) -> Result<(), BeaconError> {
        if self.provider.status(permission).is_satisfied() {
            Ok(())
        } else {
            debug!("{} not granted", permission);
            Err(BeaconError::PermissionDenied(permission))
        }
    }

    pub fn open_settings(&self) {
        info!("Opening system permission settings");
        self.provider.open_settings();
    }

    pub fn is_request_in_flight(&self) -> bool {
        lock_slot(&self.in_flight).is_some()
    }

    /// 请求所有未授权的权限，返回最终的四项快照
    ///
    /// 弹窗在后台任务中进行，调用方被取消不影响请求本身，
    /// 结果仍然交给其他等待者，槽位也会在结束时释放。
    pub async fn request(&self) -> Result<PermissionSet, BeaconError> {
        self.join_or_start()?.await
    }

    fn join_or_start(&self) -> Result<SharedResult, BeaconError> {
        let mut slot = lock_slot(&self.in_flight);

        if let Some(existing) = slot.as_ref() {
            return match self.options.overlap {
                OverlapPolicy::Coalesce => {
                    debug!("Joining in-flight permission request {}", existing.id);
                    Ok(existing.result.clone())
                }
                OverlapPolicy::Reject => {
                    warn!("Permission request rejected: another request is in flight");
                    Err(BeaconError::RequestRejected)
                }
            };
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let provider = self.provider.clone();
        let options = self.options;
        let owner = Arc::clone(&self.in_flight);

        // 槽位锁在插入前一直持有，任务不会先于插入清空槽位
        let task = tokio::spawn(async move {
            let result = resolve(provider, options).await;
            let mut slot = lock_slot(&owner);
            if slot.as_ref().is_some_and(|current| current.id == id) {
                *slot = None;
            }
            result
        });

        let result = async move {
            task.await.unwrap_or_else(|e| {
                Err(BeaconError::Platform(format!(
                    "permission request task failed: {e}"
                )))
            })
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            id,
            result: result.clone(),
        });
        Ok(result)
    }
}

fn lock_slot(slot: &Mutex<Option<InFlight>>) -> MutexGuard<'_, Option<InFlight>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn snapshot_of(provider: &dyn PermissionProvider) -> PermissionSet {
    PermissionSet::from_fn(|p| provider.status(p).is_satisfied())
}

async fn resolve(
    provider: Arc<dyn PermissionProvider>,
    options: GateOptions,
) -> Result<PermissionSet, BeaconError> {
    let before = snapshot_of(provider.as_ref());
    let missing = before.missing();
    if missing.is_empty() {
        debug!("All permissions already granted, nothing to request");
        return Ok(before);
    }

    info!("Requesting permissions: {:?}", missing);

    let prompt = async {
        match provider.prompt(&missing).await? {
            PromptOutcome::Completed(results) => {
                let mut set = snapshot_of(provider.as_ref());
                for (permission, granted) in results {
                    set.set(permission, granted);
                }
                Ok(set)
            }
            PromptOutcome::Deferred => {
                debug!(
                    "Platform has no completion signal, re-reading in {:?}",
                    options.settle_delay
                );
                tokio::time::sleep(options.settle_delay).await;
                Ok(snapshot_of(provider.as_ref()))
            }
        }
    };

    match tokio::time::timeout(options.request_timeout, prompt).await {
        Ok(Ok(set)) => {
            info!("Permission request completed: {}", set);
            Ok(set)
        }
        Ok(Err(e)) => {
            warn!("Permission request failed: {}", e);
            Err(e)
        }
        Err(_) => {
            warn!(
                "Permission request timed out after {:?}",
                options.request_timeout
            );
            Err(BeaconError::RequestTimedOut(options.request_timeout))
        }
    }
}
