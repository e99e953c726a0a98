//! 广播会话状态机
//!
//! ```text
//!            start             onStarted
//!   Idle ───────────▶ Starting ─────────▶ Advertising
//!    ▲                   │                     │
//!    └───────────────────┴─────────────────────┘
//!        stop / onStartFailed / 适配器关闭
//! ```
//!
//! - `Starting` 是"已发起、未确认"的中间态，乐观策略下已经视为正在广播
//! - 在广播中再次 `start` 会先释放旧句柄再用新载荷重新广播 (后写者胜)
//! - 每次 `start` 分配新的 generation，过期的平台回调直接丢弃
//! - 广播句柄只在会话内部持有，`stop`、启动失败、适配器关闭和会话销毁都会释放

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::payload::{self, AdvertisingPayload, ManufacturerData, TimestampSnapshot, UserId};
use super::radio::{AdvertisementRequest, Radio, RadioEvent};
use super::AdvertiseSettings;
use crate::error::BeaconError;
use crate::permission::{Permission, PermissionGate};

/// `is_advertising` 报告哪一种视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// 平台调用返回后即视为广播中
    #[default]
    Optimistic,
    /// 收到平台确认后才视为广播中
    Authoritative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting { generation: u64 },
    Advertising { generation: u64 },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    pub transition: TransitionPolicy,
}

struct ActiveAdvertisement<H> {
    generation: u64,
    payload: AdvertisingPayload,
    handle: H,
}

pub struct AdvertisingSession<R: Radio> {
    radio: Arc<R>,
    gate: Option<Arc<PermissionGate>>,
    options: SessionOptions,
    state: SessionState,
    active: Option<ActiveAdvertisement<R::Handle>>,
    next_generation: u64,
}

impl<R: Radio> AdvertisingSession<R> {
    pub fn new(radio: Arc<R>, options: SessionOptions) -> Self {
        Self {
            radio,
            gate: None,
            options,
            state: SessionState::Idle,
            active: None,
            next_generation: 1,
        }
    }

    /// 启动前检查 BLUETOOTH_ADVERTISE 权限
    ///
    /// 不设置时假定调用方已经确认过权限 (由系统强制检查的平台)。
    pub fn with_permission_gate(mut self, gate: Arc<PermissionGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 按 [`TransitionPolicy`] 报告是否正在广播
    pub fn is_advertising(&self) -> bool {
        match self.options.transition {
            TransitionPolicy::Optimistic => self.state != SessionState::Idle,
            TransitionPolicy::Authoritative => self.is_confirmed(),
        }
    }

    /// 平台是否已确认广播
    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, SessionState::Advertising { .. })
    }

    pub fn current_payload(&self) -> Option<AdvertisingPayload> {
        self.active.as_ref().map(|a| a.payload)
    }

    /// 以当前本地时间开始广播
    pub async fn start(&mut self, user_id: UserId) -> Result<AdvertisingPayload, BeaconError> {
        self.start_at(user_id, TimestampSnapshot::now()).await
    }

    /// 开始 (或替换) 广播
    ///
    /// 前置条件不满足时不改变状态，正在进行的广播保持不变。
    pub async fn start_at(
        &mut self,
        user_id: UserId,
        timestamp: TimestampSnapshot,
    ) -> Result<AdvertisingPayload, BeaconError> {
        let adapter = self.radio.adapter_state().await;
        if !adapter.is_powered_on() {
            warn!("Cannot advertise: Bluetooth adapter is {}", adapter);
            return Err(BeaconError::RadioUnavailable(adapter));
        }

        if let Some(gate) = &self.gate {
            gate.ensure(Permission::BluetoothAdvertise)?;
        }

        let payload = payload::encode_snapshot(user_id, timestamp);

        if let Some(previous) = self.active.take() {
            debug!(
                "Replacing advertisement generation {} with new payload",
                previous.generation
            );
            self.radio.stop_advertising(previous.handle).await;
            self.state = SessionState::Idle;
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let request = AdvertisementRequest {
            generation,
            frame: ManufacturerData::canonical(&payload),
            settings: AdvertiseSettings::BEACON,
        };

        match self.radio.start_advertising(request).await {
            Ok(handle) => {
                self.active = Some(ActiveAdvertisement {
                    generation,
                    payload,
                    handle,
                });
                self.state = SessionState::Starting { generation };
                info!(
                    "Advertising requested: user_id={}, timestamp={}, generation={}",
                    user_id,
                    payload.timestamp(),
                    generation
                );
                Ok(payload)
            }
            Err(e) => {
                error!("Failed to start advertising: {}", e);
                self.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    /// 停止广播；空闲时什么也不做
    ///
    /// 返回是否真的停止了一个广播。
    pub async fn stop(&mut self) -> bool {
        match self.release().await {
            Some(generation) => {
                info!("Advertising stopped (generation {})", generation);
                true
            }
            None => {
                debug!("stop() while idle, nothing to do");
                false
            }
        }
    }

    /// 处理平台回调
    pub async fn handle_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::AdvertisingStarted { generation } => match self.state {
                SessionState::Starting { generation: current } if current == generation => {
                    info!("Advertising confirmed by platform (generation {})", generation);
                    self.state = SessionState::Advertising { generation };
                }
                _ => debug!("Ignoring stale start confirmation (generation {})", generation),
            },
            RadioEvent::AdvertisingFailed { generation, code } => {
                if self.active_generation() == Some(generation) {
                    error!(
                        "Platform rejected advertising (generation {}, code {})",
                        generation, code
                    );
                    self.release().await;
                } else {
                    debug!(
                        "Ignoring stale start failure (generation {}, code {})",
                        generation, code
                    );
                }
            }
            RadioEvent::PoweredOff => {
                if let Some(generation) = self.release().await {
                    warn!(
                        "Bluetooth powered off, advertising generation {} torn down",
                        generation
                    );
                } else {
                    info!("Bluetooth powered off");
                }
            }
            RadioEvent::PoweredOn => info!("Bluetooth powered on"),
        }
    }

    /// 会话销毁前释放广播
    pub async fn shutdown(&mut self) {
        if let Some(generation) = self.release().await {
            info!("Session shut down, advertising generation {} released", generation);
        }
    }

    fn active_generation(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.generation)
    }

    async fn release(&mut self) -> Option<u64> {
        let active = self.active.take()?;
        self.radio.stop_advertising(active.handle).await;
        self.state = SessionState::Idle;
        Some(active.generation)
    }
}

impl<R: Radio> Drop for AdvertisingSession<R> {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            // 无法 async，句柄随会话一起 drop
            debug!(
                "AdvertisingSession dropped with generation {} active",
                active.generation
            );
        }
    }
}
