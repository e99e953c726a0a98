//! 模拟无线电
//!
//! 没有真实硬件时的广播后端，也是测试用的替身。
//! 行为可以脚本化 (启动成功/异步失败/同步拒绝/无回调)，
//! 并统计存活的广播句柄数量，用于检查资源是否泄漏。

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};

use super::radio::{AdvertisementRequest, Radio, RadioEvent};
use super::AdapterState;
use crate::error::BeaconError;

/// 模拟的平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimPlatform {
    /// 运行时权限带完成回调，可以请求打开蓝牙
    #[default]
    Android,
    /// 权限请求后延迟重新读取，蓝牙只能手动打开
    Ios,
}

/// `start_advertising` 的模拟结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartBehaviour {
    /// 返回句柄并回调启动成功
    Succeed,
    /// 返回句柄，随后回调启动失败
    FailAsync(i32),
    /// 平台调用直接失败
    RejectSync(String),
    /// 返回句柄，不产生任何回调
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableBehaviour {
    /// 弹出系统开启蓝牙对话框 (模拟用户同意)
    Prompt,
    Unsupported,
}

/// 模拟的广播句柄，drop 时计数减一
#[derive(Debug)]
pub struct SimHandle {
    id: u64,
    live: Arc<AtomicUsize>,
}

impl SimHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct SimState {
    adapter: AdapterState,
    start: StartBehaviour,
    enable: EnableBehaviour,
    starts: u64,
    stops: u64,
    enable_requests: u32,
    last_request: Option<AdvertisementRequest>,
}

pub struct SimulatedRadio {
    state: Mutex<SimState>,
    live: Arc<AtomicUsize>,
    next_id: AtomicU64,
    events: mpsc::UnboundedSender<RadioEvent>,
}

impl SimulatedRadio {
    /// 创建已开启的模拟适配器，同时返回事件接收端
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RadioEvent>) {
        Self::for_platform(SimPlatform::Android)
    }

    pub fn for_platform(platform: SimPlatform) -> (Self, mpsc::UnboundedReceiver<RadioEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let enable = match platform {
            SimPlatform::Android => EnableBehaviour::Prompt,
            SimPlatform::Ios => EnableBehaviour::Unsupported,
        };
        let radio = Self {
            state: Mutex::new(SimState {
                adapter: AdapterState::PoweredOn,
                start: StartBehaviour::Succeed,
                enable,
                starts: 0,
                stops: 0,
                enable_requests: 0,
                last_request: None,
            }),
            live: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
            events: tx,
        };
        (radio, rx)
    }

    pub async fn set_adapter_state(&self, adapter: AdapterState) {
        self.state.lock().await.adapter = adapter;
    }

    pub async fn set_start_behaviour(&self, behaviour: StartBehaviour) {
        self.state.lock().await.start = behaviour;
    }

    pub async fn set_enable_behaviour(&self, behaviour: EnableBehaviour) {
        self.state.lock().await.enable = behaviour;
    }

    /// 关闭适配器并发出 [`RadioEvent::PoweredOff`]
    pub async fn power_off(&self) {
        self.state.lock().await.adapter = AdapterState::PoweredOff;
        self.emit(RadioEvent::PoweredOff);
    }

    pub async fn power_on(&self) {
        self.state.lock().await.adapter = AdapterState::PoweredOn;
        self.emit(RadioEvent::PoweredOn);
    }

    /// 尚未释放的广播句柄数量
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub async fn starts(&self) -> u64 {
        self.state.lock().await.starts
    }

    pub async fn stops(&self) -> u64 {
        self.state.lock().await.stops
    }

    pub async fn enable_requests(&self) -> u32 {
        self.state.lock().await.enable_requests
    }

    pub async fn last_request(&self) -> Option<AdvertisementRequest> {
        self.state.lock().await.last_request.clone()
    }

    fn emit(&self, event: RadioEvent) {
        // 接收端已关闭时忽略
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Radio for SimulatedRadio {
    type Handle = SimHandle;

    async fn adapter_state(&self) -> AdapterState {
        self.state.lock().await.adapter
    }

    async fn start_advertising(
        &self,
        request: AdvertisementRequest,
    ) -> Result<SimHandle, BeaconError> {
        let mut state = self.state.lock().await;
        state.starts += 1;
        let generation = request.generation;
        debug!(
            "Simulated advertise: generation={}, company=0x{:04X}, body={:02x?}",
            generation, request.frame.company_id, request.frame.body
        );
        state.last_request = Some(request);

        match state.start.clone() {
            StartBehaviour::RejectSync(reason) => {
                return Err(BeaconError::PlatformStartFailure { code: -1, reason });
            }
            StartBehaviour::Succeed => self.emit(RadioEvent::AdvertisingStarted { generation }),
            StartBehaviour::FailAsync(code) => {
                self.emit(RadioEvent::AdvertisingFailed { generation, code });
            }
            StartBehaviour::Silent => {}
        }

        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(SimHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            live: self.live.clone(),
        })
    }

    async fn stop_advertising(&self, handle: SimHandle) {
        self.state.lock().await.stops += 1;
        debug!("Simulated advertise stopped: handle={}", handle.id());
        drop(handle);
    }

    async fn request_enable(&self) -> Result<(), BeaconError> {
        let mut state = self.state.lock().await;
        state.enable_requests += 1;
        match state.enable {
            EnableBehaviour::Prompt => {
                if !state.adapter.is_powered_on() {
                    info!("Simulated user accepted the enable-Bluetooth prompt");
                    state.adapter = AdapterState::PoweredOn;
                    drop(state);
                    self.emit(RadioEvent::PoweredOn);
                }
                Ok(())
            }
            EnableBehaviour::Unsupported => Err(BeaconError::NotSupported(
                "Bluetooth must be enabled manually from Settings".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::{AdvertiseSettings, ManufacturerData};

    fn request(generation: u64) -> AdvertisementRequest {
        AdvertisementRequest {
            generation,
            frame: ManufacturerData {
                company_id: 0xFFFF,
                body: vec![0; 7],
            },
            settings: AdvertiseSettings::BEACON,
        }
    }

    #[tokio::test]
    async fn test_events_follow_behaviour() {
        let (radio, mut events) = SimulatedRadio::new();

        let handle = radio.start_advertising(request(1)).await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(RadioEvent::AdvertisingStarted { generation: 1 })
        );

        radio.set_start_behaviour(StartBehaviour::FailAsync(3)).await;
        let second = radio.start_advertising(request(2)).await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(RadioEvent::AdvertisingFailed {
                generation: 2,
                code: 3
            })
        );

        assert_eq!(radio.live_handles(), 2);
        radio.stop_advertising(handle).await;
        drop(second);
        assert_eq!(radio.live_handles(), 0);
        assert_eq!(radio.stops().await, 1);
    }

    #[tokio::test]
    async fn test_ios_cannot_enable_radio() {
        let (radio, _events) = SimulatedRadio::for_platform(SimPlatform::Ios);
        radio.set_adapter_state(AdapterState::PoweredOff).await;

        let err = radio.request_enable().await.unwrap_err();
        assert_eq!(err.code(), "NOT_SUPPORTED");
        assert_eq!(radio.adapter_state().await, AdapterState::PoweredOff);
    }

    #[tokio::test]
    async fn test_android_enable_prompt_powers_on() {
        let (radio, mut events) = SimulatedRadio::new();
        radio.set_adapter_state(AdapterState::PoweredOff).await;

        radio.request_enable().await.unwrap();
        assert_eq!(radio.adapter_state().await, AdapterState::PoweredOn);
        assert_eq!(events.recv().await, Some(RadioEvent::PoweredOn));
        assert_eq!(radio.enable_requests().await, 1);
    }
}
