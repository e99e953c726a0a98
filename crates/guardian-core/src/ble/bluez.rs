//! BlueZ 广播后端
//!
//! 通过 bluer (D-Bus) 注册 LE 广播。BlueZ 没有"启动完成"回调，
//! `advertise()` 返回即表示注册成功，因此同时发出
//! [`RadioEvent::AdvertisingStarted`]。

use async_trait::async_trait;
use bluer::adv::{Advertisement, AdvertisementHandle, Type};
use bluer::{AdapterEvent, AdapterProperty, ErrorKind};
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::radio::{AdvertisementRequest, Radio, RadioEvent};
use super::AdapterState;
use crate::error::BeaconError;

pub struct BluezRadio {
    _session: bluer::Session,
    adapter: bluer::Adapter,
    events: mpsc::UnboundedSender<RadioEvent>,
    watcher: JoinHandle<()>,
}

impl BluezRadio {
    /// 连接 bluetoothd；`adapter` 为空时使用默认适配器
    pub async fn new(
        adapter: Option<&str>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RadioEvent>), BeaconError> {
        let session = bluer::Session::new().await.map_err(platform)?;
        let adapter = match adapter {
            Some(name) => session.adapter(name).map_err(platform)?,
            None => session.default_adapter().await.map_err(platform)?,
        };
        info!("Using Bluetooth adapter {}", adapter.name());

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = spawn_power_watcher(adapter.clone(), tx.clone()).await?;

        let radio = Self {
            _session: session,
            adapter,
            events: tx,
            watcher,
        };
        Ok((radio, rx))
    }
}

async fn spawn_power_watcher(
    adapter: bluer::Adapter,
    tx: mpsc::UnboundedSender<RadioEvent>,
) -> Result<JoinHandle<()>, BeaconError> {
    let events = adapter.events().await.map_err(platform)?;
    Ok(tokio::spawn(async move {
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) = event {
                debug!("Adapter {} powered={}", adapter.name(), powered);
                let event = if powered {
                    RadioEvent::PoweredOn
                } else {
                    RadioEvent::PoweredOff
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        }
    }))
}

fn platform(e: bluer::Error) -> BeaconError {
    BeaconError::Platform(e.to_string())
}

#[async_trait]
impl Radio for BluezRadio {
    type Handle = AdvertisementHandle;

    async fn adapter_state(&self) -> AdapterState {
        match self.adapter.is_powered().await {
            Ok(true) => AdapterState::PoweredOn,
            Ok(false) => AdapterState::PoweredOff,
            Err(e) if matches!(e.kind, ErrorKind::NotAuthorized | ErrorKind::NotPermitted) => {
                AdapterState::Unauthorized
            }
            Err(e) => {
                warn!("Failed to query adapter state: {}", e);
                AdapterState::Unsupported
            }
        }
    }

    async fn start_advertising(
        &self,
        request: AdvertisementRequest,
    ) -> Result<Self::Handle, BeaconError> {
        let settings = request.settings;
        let interval = Duration::from_millis(settings.mode.interval_ms());

        let adv = Advertisement {
            advertisement_type: if settings.connectable {
                Type::Peripheral
            } else {
                Type::Broadcast
            },
            manufacturer_data: BTreeMap::from([(
                request.frame.company_id,
                request.frame.body.clone(),
            )]),
            discoverable: Some(false),
            local_name: None,
            min_interval: Some(interval),
            max_interval: Some(interval),
            tx_power: Some(settings.tx_power.dbm()),
            ..Default::default()
        };

        match self.adapter.advertise(adv).await {
            Ok(handle) => {
                debug!("BlueZ advertisement registered (generation {})", request.generation);
                let _ = self.events.send(RadioEvent::AdvertisingStarted {
                    generation: request.generation,
                });
                Ok(handle)
            }
            Err(e) => Err(BeaconError::PlatformStartFailure {
                code: -1,
                reason: e.to_string(),
            }),
        }
    }

    async fn stop_advertising(&self, handle: Self::Handle) {
        // 句柄 drop 后 bluer 向 BlueZ 注销广播
        drop(handle);
        debug!("BlueZ advertisement unregistered");
    }

    async fn request_enable(&self) -> Result<(), BeaconError> {
        info!("Powering on adapter {}", self.adapter.name());
        self.adapter.set_powered(true).await.map_err(platform)
    }
}

impl Drop for BluezRadio {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
