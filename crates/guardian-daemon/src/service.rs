//! Core Service - 组装无线电后端、权限网关和命令分发

use anyhow::Result;
use guardian_core::permission::PermissionProvider;
use guardian_core::{
    Backend, BeaconService, BeaconSettings, PermissionGate, Radio, RadioEvent,
    SimulatedPermissions, SimulatedRadio,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::ipc;

pub async fn run(settings: BeaconSettings) -> Result<()> {
    match settings.backend {
        Backend::Simulated => {
            tracing::info!(
                "Using simulated radio ({:?} profile)",
                settings.sim_platform
            );
            let (radio, events) = SimulatedRadio::for_platform(settings.sim_platform);
            let permissions = Arc::new(SimulatedPermissions::for_platform(settings.sim_platform));
            serve(radio, events, permissions, settings).await
        }
        Backend::Bluez => run_bluez(settings).await,
    }
}

#[cfg(feature = "bluez")]
async fn run_bluez(settings: BeaconSettings) -> Result<()> {
    use guardian_core::{BluezRadio, HostPermissions};

    let (radio, events) = BluezRadio::new(settings.adapter.as_deref()).await?;
    serve(radio, events, Arc::new(HostPermissions), settings).await
}

#[cfg(not(feature = "bluez"))]
async fn run_bluez(_settings: BeaconSettings) -> Result<()> {
    anyhow::bail!("backend = \"bluez\" requires building guardian-daemon with --features bluez")
}

async fn serve<R: Radio + 'static>(
    radio: R,
    events: UnboundedReceiver<RadioEvent>,
    permissions: Arc<dyn PermissionProvider>,
    settings: BeaconSettings,
) -> Result<()> {
    let gate = Arc::new(PermissionGate::new(permissions, settings.gate_options()));
    let service = Arc::new(BeaconService::new(Arc::new(radio), gate, &settings));
    let pump = service.spawn_event_pump(events);

    let socket = settings.socket_path();
    tracing::info!("Waiting for commands...");

    tokio::select! {
        res = ipc::run_ipc_server(socket.clone(), service.clone()) => {
            if let Err(e) = &res {
                tracing::error!("IPC server exited: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C");
        }
    }

    service.shutdown().await;
    pump.abort();
    ipc::remove_socket(&socket);
    tracing::info!("Guardian beacon daemon stopped");
    Ok(())
}
