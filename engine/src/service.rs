//! Host-facing surface of the sync engine.
//!
//! The host runtime (a foreground service, a daemon, a tray app) owns one
//! [`SyncService`]. The service wires the paired-devices store into the
//! coordinator and executes the commands the host delivers; the
//! enabled-devices flow it feeds the monitor is the store's per-device
//! enabled list gated by the global sync toggle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::info;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use camsync_store::{PairedDevicesStore, StoreResult};
use camsync_types::{Camera, DeviceConnectionState, MacAddress, PairedDevice};

use crate::DeviceSyncCoordinator;

/// A command delivered by the host runtime.
#[derive(Debug)]
pub enum ServiceCommand {
    /// Start supervising one camera now.
    ConnectDevice(PairedDevice),
    /// Stop supervising one camera.
    DisconnectDevice(MacAddress),
    /// Run one immediate reconcile pass.
    Refresh,
    /// Stop everything; the host is shutting the service down.
    StopAll,
}

/// Glue between a host runtime and the coordinator.
pub struct SyncService {
    coordinator: DeviceSyncCoordinator,
    store: Arc<PairedDevicesStore>,
    commands: mpsc::UnboundedSender<ServiceCommand>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncService {
    /// Starts the service: begins background monitoring of the store's
    /// enabled devices and accepts commands.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(coordinator: DeviceSyncCoordinator, store: Arc<PairedDevicesStore>) -> Self {
        let shutdown = CancellationToken::new();
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let initial = if *store.sync_enabled().borrow() {
            store.enabled().borrow().clone()
        } else {
            Vec::new()
        };
        let (enabled_tx, enabled_rx) = watch::channel(initial);

        let tasks = vec![
            tokio::spawn(combine_flows(store.clone(), enabled_tx, shutdown.clone())),
            tokio::spawn(command_loop(
                coordinator.clone(),
                commands_rx,
                shutdown.clone(),
            )),
        ];
        coordinator.start_background_monitoring(enabled_rx);

        Self {
            coordinator,
            store,
            commands,
            shutdown,
            tasks: Mutex::new(tasks),
        }
    }

    /// Pairs a discovered camera. The new record is enabled, so the
    /// background monitor brings the camera up on the next flow emission.
    ///
    /// # Errors
    ///
    /// Returns a [`camsync_store::StoreError`] if the record cannot be
    /// persisted.
    pub fn pair_camera(&self, camera: &Camera) -> StoreResult<()> {
        info!("pairing {}", camera.mac);
        self.store.add(PairedDevice {
            mac: camera.mac,
            name: camera.name.clone(),
            vendor_id: camera.vendor_id.clone(),
            enabled: true,
            last_synced_at: None,
        })
    }

    /// Unpairs a camera: removes the persisted record first (so no
    /// reconcile pass can bring it back), then stops any live supervision
    /// and forgets its state.
    ///
    /// # Errors
    ///
    /// Returns a [`camsync_store::StoreError`] if the record cannot be
    /// removed, in which case nothing is torn down.
    pub async fn unpair_camera(&self, mac: MacAddress) -> StoreResult<()> {
        info!("unpairing {mac}");
        self.store.remove(mac)?;
        self.coordinator.clear_device_state(mac).await;
        Ok(())
    }

    /// Enqueues a command from the host. Silently dropped after `stop`.
    pub fn dispatch(&self, command: ServiceCommand) {
        let _ = self.commands.send(command);
    }

    /// Observable map of every known camera's connection state.
    #[must_use]
    pub fn device_states(&self) -> watch::Receiver<HashMap<MacAddress, DeviceConnectionState>> {
        self.coordinator.device_states()
    }

    /// Observable scanning indicator for the host's notification.
    #[must_use]
    pub fn is_scanning(&self) -> watch::Receiver<bool> {
        self.coordinator.is_scanning()
    }

    /// Stops the command loop, the flow plumbing, and every device.
    pub async fn stop(&self) {
        info!("sync service stopping");
        self.shutdown.cancel();
        self.coordinator.stop_all_devices().await;
        let tasks = std::mem::take(&mut *self.tasks.lock().expect("service tasks poisoned"));
        for task in tasks {
            let _ = task.await;
        }
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("stopped", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Publishes the store's enabled devices gated by the global sync toggle:
/// toggle off means an empty set, which makes reconcile stop everything.
async fn combine_flows(
    store: Arc<PairedDevicesStore>,
    out: watch::Sender<Vec<PairedDevice>>,
    shutdown: CancellationToken,
) {
    let mut enabled = store.enabled();
    let mut sync_enabled = store.sync_enabled();
    loop {
        let devices = if *sync_enabled.borrow_and_update() {
            enabled.borrow_and_update().clone()
        } else {
            let _ = enabled.borrow_and_update();
            Vec::new()
        };
        out.send_replace(devices);

        tokio::select! {
            () = shutdown.cancelled() => break,
            changed = enabled.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = sync_enabled.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn command_loop(
    coordinator: DeviceSyncCoordinator,
    mut commands: mpsc::UnboundedReceiver<ServiceCommand>,
    shutdown: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            () = shutdown.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        info!("host command: {command:?}");
        match command {
            ServiceCommand::ConnectDevice(device) => coordinator.start_device_sync(&device).await,
            ServiceCommand::DisconnectDevice(mac) => coordinator.stop_device_sync(mac).await,
            ServiceCommand::Refresh => coordinator.refresh_connections().await,
            ServiceCommand::StopAll => coordinator.stop_all_devices().await,
        }
    }
}
