//! Guardian Beacon Core Library
//!
//! 以 BLE 广播发送一个 7 字节的"谁、何时"信标
//!
//! # 模块
//!
//! - **ble**: 载荷编解码、广播会话状态机、无线电后端 (模拟 / BlueZ)
//! - **permission**: 运行时权限快照和请求网关
//! - **command**: 应用层的方法调用接口
//! - **config**: 持久化设置
//!
//! # 使用示例
//!
//! ```ignore
//! use guardian_core::{BeaconService, BeaconSettings, Command, PermissionGate, SimulatedPermissions, SimulatedRadio};
//!
//! let settings = BeaconSettings::load();
//! let (radio, events) = SimulatedRadio::new();
//! let gate = PermissionGate::new(Arc::new(SimulatedPermissions::granted(settings.sim_platform)), settings.gate_options());
//! let service = Arc::new(BeaconService::new(Arc::new(radio), Arc::new(gate), &settings));
//! service.spawn_event_pump(events);
//!
//! service.execute(Command::StartAdvertising { user_id: Some(42) }).await?;
//! ```

pub mod ble;
pub mod command;
pub mod config;
pub mod error;
pub mod permission;

// BLE re-exports
pub use ble::{
    AdapterState, AdvertiseSettings, AdvertisingPayload, AdvertisingSession, Radio, RadioEvent,
    SessionState, SimPlatform, SimulatedRadio, TimestampSnapshot, TransitionPolicy, UserId,
    UserIdPolicy,
};

#[cfg(feature = "bluez")]
pub use ble::BluezRadio;

// Permission re-exports
pub use permission::{
    HostPermissions, Permission, PermissionGate, PermissionProvider, PermissionSet,
    PermissionStatus, SimulatedPermissions,
};

pub use command::{BeaconService, Command, MethodCall, Reply};
pub use config::{Backend, BeaconSettings};
pub use error::BeaconError;
