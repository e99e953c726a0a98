//! 错误类型
//!
//! 所有命令共享同一个错误枚举，每个变体对应一个稳定的错误码，
//! 通过命令接口返回给调用方。

use std::time::Duration;

use crate::ble::AdapterState;
use crate::permission::Permission;

/// 广播/权限操作错误
///
/// 实现了 `Clone`，同一个进行中的权限请求结果可以分发给多个等待者。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BeaconError {
    #[error("Bluetooth radio unavailable (adapter state: {0})")]
    RadioUnavailable(AdapterState),

    #[error("{0} permission not granted")]
    PermissionDenied(Permission),

    #[error("Advertising start failed (code {code}): {reason}")]
    PlatformStartFailure { code: i32, reason: String },

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Permission request timed out after {0:?}")]
    RequestTimedOut(Duration),

    #[error("A permission request is already in flight")]
    RequestRejected,

    #[error("User id {0} is outside 0..=65535")]
    InvalidUserId(i64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

impl BeaconError {
    /// 命令接口使用的错误码
    pub fn code(&self) -> &'static str {
        match self {
            BeaconError::RadioUnavailable(_) => "RADIO_UNAVAILABLE",
            BeaconError::PermissionDenied(_) => "PERMISSION_DENIED",
            BeaconError::PlatformStartFailure { .. } => "START_FAILED",
            BeaconError::NotSupported(_) => "NOT_SUPPORTED",
            BeaconError::RequestTimedOut(_) => "TIMEOUT",
            BeaconError::RequestRejected => "REQUEST_IN_FLIGHT",
            BeaconError::InvalidUserId(_) | BeaconError::InvalidArgument(_) => "INVALID_ARGUMENT",
            BeaconError::Platform(_) => "PLATFORM_ERROR",
        }
    }
}
