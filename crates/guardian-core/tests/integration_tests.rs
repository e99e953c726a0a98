//! 集成测试 - 命令接口与广播会话
//!
//! 通过 `BeaconService` 驱动模拟无线电和模拟权限，覆盖完整的命令流程。

use std::sync::Arc;
use std::time::Duration;

use guardian_core::ble::{EnableBehaviour, StartBehaviour, decode};
use guardian_core::permission::GateOptions;
use guardian_core::{
    AdapterState, BeaconService, BeaconSettings, Command, MethodCall, Permission, PermissionGate,
    PermissionStatus, Radio, RadioEvent, Reply, SessionState, SimPlatform, SimulatedPermissions,
    SimulatedRadio, UserIdPolicy,
};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    service: BeaconService<SimulatedRadio>,
    radio: Arc<SimulatedRadio>,
    permissions: Arc<SimulatedPermissions>,
    events: UnboundedReceiver<RadioEvent>,
}

impl Harness {
    fn new(platform: SimPlatform, permissions: SimulatedPermissions) -> Self {
        Self::with_settings(platform, permissions, BeaconSettings::default())
    }

    fn with_settings(
        platform: SimPlatform,
        permissions: SimulatedPermissions,
        settings: BeaconSettings,
    ) -> Self {
        let (radio, events) = SimulatedRadio::for_platform(platform);
        let radio = Arc::new(radio);
        let permissions = Arc::new(permissions);
        let gate = Arc::new(PermissionGate::new(
            permissions.clone(),
            settings.gate_options(),
        ));
        Self {
            service: BeaconService::new(radio.clone(), gate, &settings),
            radio,
            permissions,
            events,
        }
    }

    fn granted() -> Self {
        Self::new(
            SimPlatform::Android,
            SimulatedPermissions::granted(SimPlatform::Android),
        )
    }

    /// 把已经产生的平台回调交给会话
    async fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.service.handle_radio_event(event).await;
        }
    }
}

fn call(method: &str, args: Value) -> MethodCall {
    MethodCall::new(method, args)
}

fn error_code(reply: &Reply) -> &str {
    match reply {
        Reply::Error { code, .. } => code,
        other => panic!("expected error reply, got {:?}", other),
    }
}

/// 反复启动/停止不会泄漏广播句柄
#[tokio::test]
async fn test_start_stop_cycles_do_not_leak() {
    let mut h = Harness::granted();

    for i in 0..128i64 {
        let reply = h
            .service
            .call(&call("startAdvertising", json!({ "userId": i })))
            .await;
        assert_eq!(reply, Reply::ok(Value::Null));
        h.pump().await;
        assert!(h.service.is_advertising().await);
        assert_eq!(h.radio.live_handles(), 1);

        let reply = h.service.call(&call("stopAdvertising", Value::Null)).await;
        assert_eq!(reply, Reply::ok(Value::Null));
        assert_eq!(h.service.session_state().await, SessionState::Idle);
        assert_eq!(h.radio.live_handles(), 0);
    }

    assert_eq!(h.radio.starts().await, 128);
    assert_eq!(h.radio.stops().await, 128);
}

#[tokio::test]
async fn test_default_user_id_is_three() {
    let h = Harness::granted();
    h.service
        .execute(Command::StartAdvertising { user_id: None })
        .await
        .unwrap();

    let request = h.radio.last_request().await.unwrap();
    assert_eq!(request.frame.company_id, 0xFFFF);
    let payload = decode(&request.frame.body).unwrap();
    assert_eq!(payload.user_id().get(), 3);
}

#[tokio::test]
async fn test_out_of_range_user_id_follows_policy() {
    let h = Harness::granted();
    h.service
        .call(&call("startAdvertising", json!({ "userId": 70_000 })))
        .await;
    let body = h.radio.last_request().await.unwrap().frame.body;
    assert_eq!(&body[..2], &[0x11, 0x70]);

    let strict = BeaconSettings {
        user_id_policy: UserIdPolicy::Strict,
        ..Default::default()
    };
    let h = Harness::with_settings(
        SimPlatform::Android,
        SimulatedPermissions::granted(SimPlatform::Android),
        strict,
    );
    let reply = h
        .service
        .call(&call("startAdvertising", json!({ "userId": -1 })))
        .await;
    assert_eq!(error_code(&reply), "INVALID_ARGUMENT");
    assert_eq!(h.radio.starts().await, 0);
}

#[tokio::test]
async fn test_unsigned_user_id_follows_policy() {
    let h = Harness::granted();
    let reply = h
        .service
        .call(&call("startAdvertising", json!({ "userId": u64::MAX })))
        .await;
    assert_eq!(reply, Reply::ok(Value::Null));
    let body = h.radio.last_request().await.unwrap().frame.body;
    assert_eq!(&body[..2], &[0xFF, 0xFF]);

    let strict = BeaconSettings {
        user_id_policy: UserIdPolicy::Strict,
        ..Default::default()
    };
    let h = Harness::with_settings(
        SimPlatform::Android,
        SimulatedPermissions::granted(SimPlatform::Android),
        strict,
    );
    let reply = h
        .service
        .call(&call("startAdvertising", json!({ "userId": u64::MAX })))
        .await;
    assert_eq!(error_code(&reply), "INVALID_ARGUMENT");
}

/// 广播中再次启动：后写者胜，旧句柄被释放
#[tokio::test]
async fn test_restart_replaces_payload() {
    let mut h = Harness::granted();
    h.service
        .execute(Command::StartAdvertising { user_id: Some(1) })
        .await
        .unwrap();
    h.pump().await;
    h.service
        .execute(Command::StartAdvertising { user_id: Some(2) })
        .await
        .unwrap();
    h.pump().await;

    assert_eq!(
        h.service.session_state().await,
        SessionState::Advertising { generation: 2 }
    );
    let body = h.radio.last_request().await.unwrap().frame.body;
    assert_eq!(decode(&body).unwrap().user_id().get(), 2);
    assert_eq!(h.radio.live_handles(), 1);
}

#[tokio::test]
async fn test_power_off_forces_idle() {
    let mut h = Harness::granted();
    h.service
        .execute(Command::StartAdvertising { user_id: Some(5) })
        .await
        .unwrap();
    h.pump().await;
    assert!(h.service.is_advertising().await);

    h.radio.power_off().await;
    h.pump().await;
    assert_eq!(h.service.session_state().await, SessionState::Idle);
    assert_eq!(h.radio.live_handles(), 0);

    let reply = h.service.call(&call("isBluetoothOn", Value::Null)).await;
    assert_eq!(reply, Reply::ok(Value::Bool(false)));

    let reply = h
        .service
        .call(&call("startAdvertising", Value::Null))
        .await;
    assert_eq!(error_code(&reply), "RADIO_UNAVAILABLE");
}

/// 反复关闭适配器同样会释放广播句柄
#[tokio::test]
async fn test_power_cycles_do_not_leak() {
    let mut h = Harness::granted();

    for i in 0..128i64 {
        let reply = h
            .service
            .call(&call("startAdvertising", json!({ "userId": i })))
            .await;
        assert_eq!(reply, Reply::ok(Value::Null));
        h.pump().await;
        assert_eq!(h.radio.live_handles(), 1);

        h.radio.power_off().await;
        h.pump().await;
        assert_eq!(h.service.session_state().await, SessionState::Idle);
        assert_eq!(h.radio.live_handles(), 0);

        h.radio.power_on().await;
        h.pump().await;
        assert_eq!(h.service.session_state().await, SessionState::Idle);
    }

    assert_eq!(h.radio.starts().await, 128);
    assert_eq!(h.radio.live_handles(), 0);
}

#[tokio::test]
async fn test_start_without_advertise_permission_is_denied() {
    let h = Harness::new(
        SimPlatform::Android,
        SimulatedPermissions::for_platform(SimPlatform::Android),
    );
    let reply = h
        .service
        .call(&call("startAdvertising", Value::Null))
        .await;
    assert_eq!(error_code(&reply), "PERMISSION_DENIED");
    assert_eq!(h.service.session_state().await, SessionState::Idle);
    assert_eq!(h.radio.starts().await, 0);
}

#[tokio::test]
async fn test_async_start_failure_reports_not_advertising() {
    let mut h = Harness::granted();
    h.radio.set_start_behaviour(StartBehaviour::FailAsync(1)).await;

    h.service
        .execute(Command::StartAdvertising { user_id: None })
        .await
        .unwrap();
    h.pump().await;

    assert!(!h.service.is_advertising().await);
    assert_eq!(h.radio.live_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_permission_snapshot_always_has_four_keys() {
    for platform in [SimPlatform::Android, SimPlatform::Ios] {
        let h = Harness::new(platform, SimulatedPermissions::for_platform(platform));

        let Reply::Ok { value } = h
            .service
            .call(&call("checkNativePermissions", Value::Null))
            .await
        else {
            panic!("checkNativePermissions failed");
        };
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 4);
        for p in Permission::ALL {
            assert!(map.contains_key(p.name()));
        }

        let Reply::Ok { value } = h
            .service
            .call(&call("requestNativePermissions", Value::Null))
            .await
        else {
            panic!("requestNativePermissions failed");
        };
        assert_eq!(value.as_object().unwrap().len(), 4);
        assert!(value.as_object().unwrap().values().all(|v| v.as_bool() == Some(true)));
    }
}

/// 重叠的权限请求只弹一次窗，得到同一个结果
#[tokio::test(start_paused = true)]
async fn test_overlapping_permission_requests_share_one_result() {
    let h = Harness::new(
        SimPlatform::Android,
        SimulatedPermissions::for_platform(SimPlatform::Android),
    );
    h.permissions.decide(Permission::AccessFineLocation, false);
    h.permissions.set_prompt_delay(Duration::from_secs(3));

    let request = call("requestNativePermissions", Value::Null);
    let (a, b) = tokio::join!(h.service.call(&request), h.service.call(&request));

    assert_eq!(a, b);
    assert_eq!(h.permissions.prompts(), 1);
    let Reply::Ok { value } = a else {
        panic!("request failed");
    };
    assert_eq!(value["ACCESS_FINE_LOCATION"], false);
    assert_eq!(value["BLUETOOTH_ADVERTISE"], true);
}

#[tokio::test(start_paused = true)]
async fn test_permission_request_timeout() {
    let settings = BeaconSettings {
        request_timeout_secs: 5,
        ..Default::default()
    };
    let h = Harness::with_settings(
        SimPlatform::Android,
        SimulatedPermissions::for_platform(SimPlatform::Android),
        settings,
    );
    h.permissions.set_prompt_delay(Duration::from_secs(60));

    let reply = h
        .service
        .call(&call("requestNativePermissions", Value::Null))
        .await;
    assert_eq!(error_code(&reply), "TIMEOUT");
    assert!(!h.service.gate().is_request_in_flight());
}

#[tokio::test]
async fn test_open_app_settings_has_no_side_effects() {
    let mut h = Harness::granted();
    h.service
        .execute(Command::StartAdvertising { user_id: Some(8) })
        .await
        .unwrap();
    h.pump().await;

    let state = h.service.session_state().await;
    let permissions = h.service.gate().snapshot();

    let reply = h.service.call(&call("openAppSettings", Value::Null)).await;
    assert_eq!(reply, Reply::ok(Value::Null));
    assert_eq!(h.permissions.settings_opened(), 1);
    assert_eq!(h.service.session_state().await, state);
    assert_eq!(h.service.gate().snapshot(), permissions);
}

#[tokio::test]
async fn test_request_enable_bluetooth() {
    // 已授权：打开适配器，不影响会话
    let mut h = Harness::granted();
    h.radio.set_adapter_state(AdapterState::PoweredOff).await;
    let reply = h
        .service
        .call(&call("requestEnableBluetooth", Value::Null))
        .await;
    assert_eq!(reply, Reply::ok(Value::Null));
    h.pump().await;
    assert_eq!(h.radio.adapter_state().await, AdapterState::PoweredOn);
    assert_eq!(h.service.session_state().await, SessionState::Idle);

    // 缺少 BLUETOOTH_CONNECT
    let h = Harness::new(
        SimPlatform::Android,
        SimulatedPermissions::for_platform(SimPlatform::Android),
    );
    h.permissions
        .set_status(Permission::BluetoothAdvertise, PermissionStatus::Granted);
    let reply = h
        .service
        .call(&call("requestEnableBluetooth", Value::Null))
        .await;
    assert_eq!(error_code(&reply), "PERMISSION_DENIED");
    assert_eq!(h.radio.enable_requests().await, 0);

    // iOS 只能手动打开
    let h = Harness::new(SimPlatform::Ios, SimulatedPermissions::granted(SimPlatform::Ios));
    let reply = h
        .service
        .call(&call("requestEnableBluetooth", Value::Null))
        .await;
    assert_eq!(error_code(&reply), "NOT_SUPPORTED");
}

/// 设备不提供开启对话框时，适配器保持关闭
#[tokio::test]
async fn test_enable_unsupported_keeps_adapter_off() {
    let mut h = Harness::granted();
    h.radio.set_adapter_state(AdapterState::PoweredOff).await;
    h.radio
        .set_enable_behaviour(EnableBehaviour::Unsupported)
        .await;

    let reply = h
        .service
        .call(&call("requestEnableBluetooth", Value::Null))
        .await;
    assert_eq!(error_code(&reply), "NOT_SUPPORTED");
    h.pump().await;
    assert_eq!(h.radio.enable_requests().await, 1);
    assert_eq!(h.radio.adapter_state().await, AdapterState::PoweredOff);

    let reply = h
        .service
        .call(&call("startAdvertising", json!({ "userId": 1 })))
        .await;
    assert_eq!(error_code(&reply), "RADIO_UNAVAILABLE");
    assert_eq!(h.radio.live_handles(), 0);
}

#[tokio::test]
async fn test_stop_while_idle_is_ok() {
    let h = Harness::granted();
    let reply = h.service.call(&call("stopAdvertising", Value::Null)).await;
    assert_eq!(reply, Reply::ok(Value::Null));
    assert_eq!(h.radio.stops().await, 0);
}

#[tokio::test]
async fn test_reply_wire_format() {
    let h = Harness::granted();

    let reply = h.service.call(&call("isBluetoothOn", Value::Null)).await;
    assert_eq!(
        serde_json::to_value(&reply).unwrap(),
        json!({ "status": "ok", "value": true })
    );

    let reply = h.service.call(&call("startScanning", Value::Null)).await;
    assert_eq!(
        serde_json::to_value(&reply).unwrap(),
        json!({ "status": "notImplemented" })
    );

    let request: MethodCall =
        serde_json::from_str(r#"{"method":"startAdvertising","args":{"userId":"x"}}"#).unwrap();
    let reply = serde_json::to_value(h.service.call(&request).await).unwrap();
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_event_pump_and_shutdown() {
    let (radio, events) = SimulatedRadio::new();
    let radio = Arc::new(radio);
    let gate = Arc::new(PermissionGate::new(
        Arc::new(SimulatedPermissions::granted(SimPlatform::Android)),
        GateOptions::default(),
    ));
    let service = Arc::new(BeaconService::new(
        radio.clone(),
        gate,
        &BeaconSettings::default(),
    ));
    let pump = service.spawn_event_pump(events);

    service
        .execute(Command::StartAdvertising { user_id: Some(3) })
        .await
        .unwrap();
    for _ in 0..10 {
        if service.session_state().await != (SessionState::Starting { generation: 1 }) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(
        service.session_state().await,
        SessionState::Advertising { generation: 1 }
    );

    service.shutdown().await;
    assert_eq!(radio.live_handles(), 0);
    pump.abort();
}
