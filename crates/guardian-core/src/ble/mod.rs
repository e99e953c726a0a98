pub mod payload;
pub mod radio;
pub mod session;
pub mod sim;

#[cfg(feature = "bluez")]
pub mod bluez;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use payload::{
    AdvertisingPayload, COMPANY_ID, Framing, LEGACY_TAG, ManufacturerData, PAYLOAD_LEN,
    PayloadError, TimestampSnapshot, UserId, UserIdPolicy, decode, encode, encode_snapshot,
    parse_manufacturer_data,
};
pub use radio::{AdvertisementRequest, Radio, RadioEvent};
pub use session::{AdvertisingSession, SessionOptions, SessionState, TransitionPolicy};
pub use sim::{EnableBehaviour, SimHandle, SimPlatform, SimulatedRadio, StartBehaviour};

#[cfg(feature = "bluez")]
pub use bluez::BluezRadio;

/// 蓝牙适配器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdapterState {
    /// 没有适配器或不支持 BLE 广播
    Unsupported,
    /// 应用无权使用蓝牙
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl AdapterState {
    pub fn is_powered_on(self) -> bool {
        self == AdapterState::PoweredOn
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterState::Unsupported => "unsupported",
            AdapterState::Unauthorized => "unauthorized",
            AdapterState::PoweredOff => "powered off",
            AdapterState::PoweredOn => "powered on",
        };
        f.write_str(name)
    }
}

/// 广播模式 (对应 Android `ADVERTISE_MODE_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

impl AdvertiseMode {
    /// 广播间隔 (毫秒)
    pub fn interval_ms(self) -> u64 {
        match self {
            AdvertiseMode::LowPower => 1000,
            AdvertiseMode::Balanced => 250,
            AdvertiseMode::LowLatency => 100,
        }
    }
}

/// 发射功率档位 (对应 Android `ADVERTISE_TX_POWER_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPowerLevel {
    UltraLow,
    Low,
    Medium,
    High,
}

impl TxPowerLevel {
    pub fn dbm(self) -> i16 {
        match self {
            TxPowerLevel::UltraLow => -21,
            TxPowerLevel::Low => -15,
            TxPowerLevel::Medium => -7,
            TxPowerLevel::High => 1,
        }
    }
}

/// 广播参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertiseSettings {
    pub mode: AdvertiseMode,
    pub tx_power: TxPowerLevel,
    pub connectable: bool,
    pub include_device_name: bool,
}

impl AdvertiseSettings {
    /// 会话唯一使用的参数：不可连接、低延迟、中等功率、不带设备名
    pub const BEACON: Self = Self {
        mode: AdvertiseMode::LowLatency,
        tx_power: TxPowerLevel::Medium,
        connectable: false,
        include_device_name: false,
    };
}

impl Default for AdvertiseSettings {
    fn default() -> Self {
        Self::BEACON
    }
}
