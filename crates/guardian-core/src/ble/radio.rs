//! 平台无线电抽象
//!
//! 会话通过 [`Radio`] 访问广播硬件，而不是直接使用全局单例，
//! 测试时可以换成 [`SimulatedRadio`](super::SimulatedRadio)。
//!
//! 平台的异步回调 (广播启动成功/失败、适配器开关) 通过
//! [`RadioEvent`] 通道送回会话。

use async_trait::async_trait;

use super::{AdapterState, AdvertiseSettings, ManufacturerData};
use crate::error::BeaconError;

/// 一次广播请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementRequest {
    /// 会话分配的序号，平台回调原样带回，用于丢弃过期回调
    pub generation: u64,
    pub frame: ManufacturerData,
    pub settings: AdvertiseSettings,
}

/// 平台异步事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    AdvertisingStarted { generation: u64 },
    AdvertisingFailed { generation: u64, code: i32 },
    PoweredOn,
    PoweredOff,
}

#[async_trait]
pub trait Radio: Send + Sync {
    /// 正在进行的广播句柄，释放即停止广播
    type Handle: Send + Sync + 'static;

    async fn adapter_state(&self) -> AdapterState;

    /// 发起广播 (平台调用的同步部分)
    ///
    /// 平台最终是否成功由 [`RadioEvent::AdvertisingStarted`] /
    /// [`RadioEvent::AdvertisingFailed`] 通知。
    async fn start_advertising(
        &self,
        request: AdvertisementRequest,
    ) -> Result<Self::Handle, BeaconError>;

    async fn stop_advertising(&self, handle: Self::Handle);

    /// 请求打开蓝牙；不支持的平台返回 [`BeaconError::NotSupported`]
    async fn request_enable(&self) -> Result<(), BeaconError>;
}
