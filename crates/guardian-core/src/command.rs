//! 命令接口
//!
//! 应用层与原生层之间的方法调用，格式与 Flutter MethodChannel 保持一致：
//!
//! ```json
//! {"method": "startAdvertising", "args": {"userId": 3}}
//! ```
//!
//! 回复：
//!
//! ```json
//! {"status": "ok", "value": null}
//! {"status": "error", "code": "PERMISSION_DENIED", "message": "..."}
//! {"status": "notImplemented"}
//! ```

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::ble::{AdvertisingSession, Radio, RadioEvent, SessionState, UserId, UserIdPolicy};
use crate::config::BeaconSettings;
use crate::error::BeaconError;
use crate::permission::{Permission, PermissionGate, PermissionSet};

/// 一次方法调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }
}

/// 支持的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartAdvertising { user_id: Option<i64> },
    StopAdvertising,
    IsBluetoothOn,
    RequestEnableBluetooth,
    CheckNativePermissions,
    RequestNativePermissions,
    OpenAppSettings,
}

impl Command {
    pub fn method(&self) -> &'static str {
        match self {
            Command::StartAdvertising { .. } => "startAdvertising",
            Command::StopAdvertising => "stopAdvertising",
            Command::IsBluetoothOn => "isBluetoothOn",
            Command::RequestEnableBluetooth => "requestEnableBluetooth",
            Command::CheckNativePermissions => "checkNativePermissions",
            Command::RequestNativePermissions => "requestNativePermissions",
            Command::OpenAppSettings => "openAppSettings",
        }
    }

    /// 解析方法调用；未知方法返回 `Ok(None)`
    pub fn parse(call: &MethodCall) -> Result<Option<Self>, BeaconError> {
        let command = match call.method.as_str() {
            "startAdvertising" => Command::StartAdvertising {
                user_id: parse_user_id(&call.args)?,
            },
            "stopAdvertising" => Command::StopAdvertising,
            "isBluetoothOn" => Command::IsBluetoothOn,
            "requestEnableBluetooth" => Command::RequestEnableBluetooth,
            "checkNativePermissions" => Command::CheckNativePermissions,
            "requestNativePermissions" => Command::RequestNativePermissions,
            "openAppSettings" => Command::OpenAppSettings,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    pub fn to_call(self) -> MethodCall {
        let args = match self {
            Command::StartAdvertising {
                user_id: Some(user_id),
            } => json!({ "userId": user_id }),
            _ => Value::Null,
        };
        MethodCall::new(self.method(), args)
    }
}

fn parse_user_id(args: &Value) -> Result<Option<i64>, BeaconError> {
    match args.get("userId") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => as_integer(value)
            .map(Some)
            .ok_or_else(|| BeaconError::InvalidArgument(format!("userId must be an integer, got {value}"))),
    }
}

/// 超出 i64 的无符号数按位回绕，低 16 位不变；整数值的浮点数 (`3.0`) 同样接受
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if let Some(n) = value.as_u64() {
        return Some(n as i64);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && f.fract() == 0.0)
        .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
        .map(|f| f as i64)
}

/// 方法调用的回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Reply {
    Ok { value: Value },
    Error { code: String, message: String },
    NotImplemented,
}

impl Reply {
    pub fn ok(value: Value) -> Self {
        Reply::Ok { value }
    }
}

impl From<BeaconError> for Reply {
    fn from(e: BeaconError) -> Self {
        Reply::Error {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<Result<Value, BeaconError>> for Reply {
    fn from(result: Result<Value, BeaconError>) -> Self {
        match result {
            Ok(value) => Reply::ok(value),
            Err(e) => e.into(),
        }
    }
}

/// 命令分发
///
/// 持有进程内唯一的广播会话和权限网关。会话由互斥锁保护，
/// 权限请求不占用会话锁，等待用户授权时仍然可以停止广播。
pub struct BeaconService<R: Radio> {
    radio: Arc<R>,
    session: Mutex<AdvertisingSession<R>>,
    gate: Arc<PermissionGate>,
    default_user_id: u16,
    user_id_policy: UserIdPolicy,
}

impl<R: Radio + 'static> BeaconService<R> {
    pub fn new(radio: Arc<R>, gate: Arc<PermissionGate>, settings: &BeaconSettings) -> Self {
        let session = AdvertisingSession::new(radio.clone(), settings.session_options())
            .with_permission_gate(gate.clone());
        Self {
            radio,
            session: Mutex::new(session),
            gate,
            default_user_id: settings.default_user_id,
            user_id_policy: settings.user_id_policy,
        }
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub async fn session_state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    pub async fn is_advertising(&self) -> bool {
        self.session.lock().await.is_advertising()
    }

    /// 处理一次方法调用，总是返回回复
    pub async fn call(&self, call: &MethodCall) -> Reply {
        match Command::parse(call) {
            Ok(Some(command)) => self.execute(command).await.into(),
            Ok(None) => {
                debug!("Method not implemented: {}", call.method);
                Reply::NotImplemented
            }
            Err(e) => e.into(),
        }
    }

    pub async fn execute(&self, command: Command) -> Result<Value, BeaconError> {
        debug!("Executing {:?}", command);
        match command {
            Command::StartAdvertising { user_id } => {
                let user_id = match user_id {
                    Some(raw) => UserId::with_policy(raw, self.user_id_policy)?,
                    None => UserId::new(self.default_user_id),
                };
                self.session.lock().await.start(user_id).await?;
                Ok(Value::Null)
            }
            Command::StopAdvertising => {
                self.session.lock().await.stop().await;
                Ok(Value::Null)
            }
            Command::IsBluetoothOn => {
                Ok(Value::Bool(self.radio.adapter_state().await.is_powered_on()))
            }
            Command::RequestEnableBluetooth => {
                self.gate.ensure(Permission::BluetoothConnect)?;
                self.radio.request_enable().await?;
                Ok(Value::Null)
            }
            Command::CheckNativePermissions => permissions_value(&self.gate.snapshot()),
            Command::RequestNativePermissions => permissions_value(&self.gate.request().await?),
            Command::OpenAppSettings => {
                self.gate.open_settings();
                Ok(Value::Null)
            }
        }
    }

    pub async fn handle_radio_event(&self, event: RadioEvent) {
        self.session.lock().await.handle_event(event).await;
    }

    /// 把平台回调转发给会话，直到通道关闭
    pub fn spawn_event_pump(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<RadioEvent>,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                service.handle_radio_event(event).await;
            }
            debug!("Radio event channel closed");
        })
    }

    pub async fn shutdown(&self) {
        info!("Shutting down beacon service");
        self.session.lock().await.shutdown().await;
    }
}

fn permissions_value(set: &PermissionSet) -> Result<Value, BeaconError> {
    serde_json::to_value(set).map_err(|e| BeaconError::Platform(e.to_string()))
}
