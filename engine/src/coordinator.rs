//! Per-device supervision, fix fan-out and background reconciliation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Local, Utc};
use log::{debug, info, warn};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use camsync_ble::{BleError, BleTransport, CameraConnection, FoundCallback};
use camsync_location::LocationCollector;
use camsync_store::PairedDevicesStore;
use camsync_types::{
    Camera, DeviceConnectionState, GpsLocation, LocationSyncInfo, MacAddress, PairedDevice,
};
use camsync_vendor::{Vendor, VendorRegistry};

use crate::CoordinatorConfig;

/// Supervising-task record for one camera.
struct DeviceJob {
    cancel: CancellationToken,
    /// Taken by the first stop so it can await the task's cleanup; the
    /// record itself is removed by that cleanup.
    handle: Option<JoinHandle<()>>,
}

/// Both maps share one lock: a MAC's job and its connection slot are
/// always observed together.
#[derive(Default)]
struct ConnectionTable {
    connections: HashMap<MacAddress, Arc<CameraConnection>>,
    jobs: HashMap<MacAddress, DeviceJob>,
}

struct BackgroundTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// How one supervising task's active phase ended.
enum DeviceOutcome {
    /// The link went (or was) down; the passive liveness watch is the
    /// source of truth, so this is a plain disconnect.
    LinkDown,
    /// The connect deadline elapsed.
    DeadlineElapsed,
    /// Anything else; carries the transport error for classification.
    Failed(BleError),
}

struct Inner {
    transport: Arc<dyn BleTransport>,
    registry: Arc<VendorRegistry>,
    collector: Arc<LocationCollector>,
    store: Arc<PairedDevicesStore>,
    config: CoordinatorConfig,
    table: AsyncMutex<ConnectionTable>,
    states_tx: watch::Sender<HashMap<MacAddress, DeviceConnectionState>>,
    scanning_tx: watch::Sender<bool>,
    /// Serializes reconcile passes; never held across per-device waits.
    reconcile_gate: AsyncMutex<()>,
    reconcile_active: AtomicBool,
    latest_enabled: Mutex<Vec<PairedDevice>>,
    fanout: Mutex<Option<BackgroundTask>>,
    monitor: Mutex<Option<BackgroundTask>>,
}

/// Supervises one connection per enabled camera and keeps every live
/// camera fed with the host's location.
///
/// Cheap to clone; all clones share the same supervision state.
#[derive(Clone)]
pub struct DeviceSyncCoordinator {
    inner: Arc<Inner>,
}

impl DeviceSyncCoordinator {
    /// Creates a coordinator over the given collaborators.
    #[must_use]
    pub fn new(
        transport: Arc<dyn BleTransport>,
        registry: Arc<VendorRegistry>,
        collector: Arc<LocationCollector>,
        store: Arc<PairedDevicesStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                registry,
                collector,
                store,
                config,
                table: AsyncMutex::new(ConnectionTable::default()),
                states_tx: watch::channel(HashMap::new()).0,
                scanning_tx: watch::channel(false).0,
                reconcile_gate: AsyncMutex::new(()),
                reconcile_active: AtomicBool::new(false),
                latest_enabled: Mutex::new(Vec::new()),
                fanout: Mutex::new(None),
                monitor: Mutex::new(None),
            }),
        }
    }

    /// Observable map of every known camera's connection state.
    #[must_use]
    pub fn device_states(&self) -> watch::Receiver<HashMap<MacAddress, DeviceConnectionState>> {
        self.inner.states_tx.subscribe()
    }

    /// True while a reconcile pass runs or any camera is being searched
    /// for or connected to.
    #[must_use]
    pub fn is_scanning(&self) -> watch::Receiver<bool> {
        self.inner.scanning_tx.subscribe()
    }

    /// Starts the long-lived monitor that follows the enabled-devices
    /// flow and reconciles every period. Starting twice is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_background_monitoring(&self, enabled: watch::Receiver<Vec<PairedDevice>>) {
        let mut slot = self.inner.monitor.lock().expect("monitor slot poisoned");
        if slot.is_some() {
            warn!("background monitoring already started");
            return;
        }
        *self
            .inner
            .latest_enabled
            .lock()
            .expect("enabled cache poisoned") = enabled.borrow().clone();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Inner::run_monitor(
            self.inner.clone(),
            enabled,
            cancel.clone(),
        ));
        *slot = Some(BackgroundTask { cancel, handle });
    }

    /// Runs one immediate reconcile pass.
    pub async fn refresh_connections(&self) {
        self.inner.reconcile().await;
    }

    /// Begins supervising a camera. A camera already under supervision is
    /// left alone.
    pub async fn start_device_sync(&self, device: &PairedDevice) {
        self.inner.start_device_sync(device).await;
    }

    /// Stops supervising a camera and waits for its cleanup to finish.
    pub async fn stop_device_sync(&self, mac: MacAddress) {
        self.inner.stop_device_sync(mac).await;
    }

    /// Stops every supervising task, the background monitor, and the
    /// location fan-out.
    pub async fn stop_all_devices(&self) {
        let monitor = self
            .inner
            .monitor
            .lock()
            .expect("monitor slot poisoned")
            .take();
        if let Some(task) = monitor {
            task.cancel.cancel();
            let _ = task.handle.await;
        }

        let macs: Vec<MacAddress> = {
            let table = self.inner.table.lock().await;
            table.jobs.keys().copied().collect()
        };
        for mac in macs {
            self.inner.stop_device_sync(mac).await;
        }
        self.inner.stop_fanout();
    }

    /// Retries a camera stuck in `Unreachable` or a recoverable error.
    /// Any other state is a no-op.
    pub async fn retry_device_connection(&self, device: &PairedDevice) {
        let retryable = self
            .inner
            .states_tx
            .borrow()
            .get(&device.mac)
            .is_some_and(DeviceConnectionState::is_retryable);
        if retryable {
            self.inner.start_device_sync(device).await;
        }
    }

    /// Forgets a camera entirely, used on unpair. Stops any live
    /// supervision first.
    pub async fn clear_device_state(&self, mac: MacAddress) {
        self.inner.stop_device_sync(mac).await;
        self.inner.states_tx.send_modify(|states| {
            states.remove(&mac);
        });
        self.inner.update_scanning();
    }
}

impl std::fmt::Debug for DeviceSyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSyncCoordinator")
            .field("known_devices", &self.inner.states_tx.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn start_device_sync(self: &Arc<Self>, device: &PairedDevice) {
        let mac = device.mac;
        let Some(vendor) = self.registry.by_id(&device.vendor_id) else {
            warn!("no vendor {} for {mac}", device.vendor_id);
            self.set_state(
                mac,
                DeviceConnectionState::Error {
                    message: String::from("Unknown vendor"),
                    recoverable: false,
                },
            );
            return;
        };

        let mut table = self.table.lock().await;
        if table.jobs.contains_key(&mac) {
            debug!("{mac} already under supervision");
            return;
        }

        // Register before connecting so the GPS source is already
        // producing by the time the handshake completes.
        if let Err(err) = self.collector.register_device(mac) {
            drop(table);
            warn!("location registration for {mac} failed: {err}");
            self.set_state(
                mac,
                DeviceConnectionState::Error {
                    message: err.to_string(),
                    recoverable: true,
                },
            );
            return;
        }

        info!("starting sync for {mac}");
        self.set_state(mac, DeviceConnectionState::Searching);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Self::run_device(
            self.clone(),
            Camera::from_paired(device),
            vendor,
            cancel.clone(),
        ));
        table.jobs.insert(
            mac,
            DeviceJob {
                cancel,
                handle: Some(handle),
            },
        );
    }

    async fn stop_device_sync(&self, mac: MacAddress) {
        let job = {
            let mut table = self.table.lock().await;
            table
                .jobs
                .get_mut(&mac)
                .map(|job| (job.cancel.clone(), job.handle.take()))
        };
        let Some((cancel, handle)) = job else {
            return;
        };
        info!("stopping sync for {mac}");
        cancel.cancel();
        match handle {
            // The task finishes by running its cleanup, so this returns
            // only once the MAC's resources are released.
            Some(handle) => {
                let _ = handle.await;
            }
            // A concurrent stop already holds the join handle; wait for
            // its cleanup to drop the record.
            None => {
                while self.table.lock().await.jobs.contains_key(&mac) {
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Body of one supervising task.
    async fn run_device(
        self: Arc<Self>,
        camera: Camera,
        vendor: Arc<dyn Vendor>,
        cancel: CancellationToken,
    ) {
        let mac = camera.mac;
        let outcome = tokio::select! {
            () = cancel.cancelled() => {
                debug!("supervision of {mac} cancelled");
                self.cleanup(mac, false).await;
                return;
            }
            outcome = self.drive_device(&camera, vendor) => outcome,
        };

        match outcome {
            DeviceOutcome::LinkDown => {
                info!("link to {mac} is down");
                self.cleanup(mac, false).await;
            }
            DeviceOutcome::DeadlineElapsed => {
                info!("{mac} unreachable within the connect deadline");
                self.set_state(mac, DeviceConnectionState::Unreachable);
                self.cleanup(mac, true).await;
            }
            DeviceOutcome::Failed(err) => {
                let message = user_message(err);
                warn!("sync attempt for {mac} failed: {message}");
                self.set_state(
                    mac,
                    DeviceConnectionState::Error {
                        message,
                        recoverable: true,
                    },
                );
                self.cleanup(mac, true).await;
            }
        }
    }

    /// Connect, handshake, then hold the link until it drops.
    async fn drive_device(
        self: &Arc<Self>,
        camera: &Camera,
        vendor: Arc<dyn Vendor>,
    ) -> DeviceOutcome {
        let mac = camera.mac;
        let connection = match tokio::time::timeout(
            self.config.connect_deadline,
            self.establish(camera, vendor),
        )
        .await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(BleError::LinkLost)) => return DeviceOutcome::LinkDown,
            Ok(Err(err)) => return DeviceOutcome::Failed(err),
            Err(_) => return DeviceOutcome::DeadlineElapsed,
        };

        match self.handshake(&connection).await {
            Ok(firmware) => {
                info!("{mac} handshake complete (firmware {firmware:?})");
                self.set_state(
                    mac,
                    DeviceConnectionState::Syncing {
                        firmware,
                        last_sync: None,
                    },
                );
                self.ensure_fanout();
            }
            Err(BleError::LinkLost) => return DeviceOutcome::LinkDown,
            Err(err) => return DeviceOutcome::Failed(err),
        }

        // Passive watch: only the liveness signal ends a healthy session.
        let mut live = connection.is_connected();
        match live.wait_for(|up| !*up).await {
            Ok(_) | Err(_) => DeviceOutcome::LinkDown,
        }
    }

    /// Acquires the peripheral and waits for a verified-live link.
    async fn establish(
        self: &Arc<Self>,
        camera: &Camera,
        vendor: Arc<dyn Vendor>,
    ) -> Result<Arc<CameraConnection>, BleError> {
        let mac = camera.mac;
        let on_found: FoundCallback = {
            let inner = self.clone();
            Box::new(move || inner.advance_to_connecting(mac))
        };
        let link = self.transport.connect(camera, Some(on_found)).await?;
        let connection = Arc::new(CameraConnection::new(link, vendor));
        self.table
            .lock()
            .await
            .connections
            .insert(mac, connection.clone());

        // No GATT I/O before the link reports live.
        let mut live = connection.is_connected();
        live.wait_for(|up| *up)
            .await
            .map_err(|_| BleError::LinkLost)?;
        self.set_state(mac, DeviceConnectionState::Connected { firmware: None });
        Ok(connection)
    }

    /// The ordered handshake. Every step is tolerated on failure except a
    /// lost link, which aborts.
    async fn handshake(&self, connection: &CameraConnection) -> Result<Option<String>, BleError> {
        let firmware = match connection.read_firmware_version().await {
            Ok(version) => Some(version),
            Err(BleError::LinkLost) => return Err(BleError::LinkLost),
            Err(BleError::Unsupported { .. }) => None,
            Err(err) => {
                warn!("firmware version read failed: {err}");
                Some(String::from("Unknown"))
            }
        };

        let name = (self.config.paired_name)();
        match connection.set_paired_device_name(&name).await {
            Ok(()) | Err(BleError::Unsupported { .. }) => {}
            Err(BleError::LinkLost) => return Err(BleError::LinkLost),
            Err(err) => warn!("paired-device name write failed: {err}"),
        }

        match connection.sync_date_time(Local::now().naive_local()).await {
            Ok(()) | Err(BleError::Unsupported { .. }) => {}
            Err(BleError::LinkLost) => return Err(BleError::LinkLost),
            Err(err) => warn!("date-time write failed: {err}"),
        }

        match connection.set_geo_tagging_enabled(true).await {
            Ok(()) | Err(BleError::Unsupported { .. }) => {}
            Err(BleError::LinkLost) => return Err(BleError::LinkLost),
            Err(err) => warn!("geo-tagging enable failed: {err}"),
        }

        Ok(firmware)
    }

    /// Releases everything a supervising task owns for `mac`.
    ///
    /// `preserve_error` keeps an `Unreachable`/`Error` state set by the
    /// failure branch; an unrecoverable error additionally survives every
    /// cleanup and yields only to an explicit retry or unpair.
    async fn cleanup(&self, mac: MacAddress, preserve_error: bool) {
        let connection = {
            let mut table = self.table.lock().await;
            table.jobs.remove(&mac);
            table.connections.remove(&mac)
        };
        if let Some(connection) = connection {
            if let Err(err) = connection.disconnect().await {
                warn!("disconnect of {mac} failed: {err}");
            }
        }

        self.collector.unregister_device(mac);
        if self.collector.registered_count() == 0 {
            self.stop_fanout();
        }

        self.states_tx.send_modify(|states| {
            let keep = match states.get(&mac) {
                Some(DeviceConnectionState::Error {
                    recoverable: false, ..
                }) => true,
                Some(
                    DeviceConnectionState::Unreachable | DeviceConnectionState::Error { .. },
                ) => preserve_error,
                _ => false,
            };
            if !keep {
                states.insert(mac, DeviceConnectionState::Disconnected);
            }
        });
        self.update_scanning();
    }

    /// Starts the fix fan-out if it is not already running.
    fn ensure_fanout(self: &Arc<Self>) {
        let mut slot = self.fanout.lock().expect("fan-out slot poisoned");
        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return;
        }
        debug!("starting location fan-out");
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Self::run_fanout(self.clone(), cancel.clone()));
        *slot = Some(BackgroundTask { cancel, handle });
    }

    fn stop_fanout(&self) {
        if let Some(task) = self.fanout.lock().expect("fan-out slot poisoned").take() {
            debug!("stopping location fan-out");
            task.cancel.cancel();
        }
    }

    /// The single fan-out task: every fix goes to every live connection
    /// whose vendor can take it.
    async fn run_fanout(self: Arc<Self>, cancel: CancellationToken) {
        let mut updates = self.collector.updates();
        // The subscription marks the current value as seen; deliver it
        // first so a fix that raced the task start is not dropped.
        let latest = updates.borrow_and_update().clone();
        if let Some(fix) = latest {
            self.broadcast_fix(&fix).await;
        }
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let fix = updates.borrow_and_update().clone();
                    if let Some(fix) = fix {
                        self.broadcast_fix(&fix).await;
                    }
                }
            }
        }
    }

    async fn broadcast_fix(&self, fix: &GpsLocation) {
        // Snapshot under the lock; the writes happen outside it.
        let targets: Vec<(MacAddress, Arc<CameraConnection>)> = {
            let table = self.table.lock().await;
            table
                .connections
                .iter()
                .filter(|(_, connection)| connection.vendor().capabilities().writes_location)
                .map(|(mac, connection)| (*mac, connection.clone()))
                .collect()
        };

        for (mac, connection) in targets {
            match connection.sync_location(fix).await {
                Ok(()) => self.record_sync(mac, fix),
                Err(err) => {
                    // State stays put: the liveness watch decides.
                    warn!("location write to {mac} failed: {err}");
                }
            }
        }
    }

    fn record_sync(&self, mac: MacAddress, fix: &GpsLocation) {
        let now = Utc::now();
        if let Err(err) = self.store.update_last_synced_at(mac, now.timestamp_millis()) {
            warn!("persisting last sync for {mac} failed: {err}");
        }
        self.states_tx.send_modify(|states| {
            let Some(state) = states.get_mut(&mac) else {
                return;
            };
            let firmware = match state {
                DeviceConnectionState::Connected { firmware }
                | DeviceConnectionState::Syncing { firmware, .. } => firmware.take(),
                _ => return,
            };
            *state = DeviceConnectionState::Syncing {
                firmware,
                last_sync: Some(LocationSyncInfo {
                    synced_at: now,
                    location: fix.clone(),
                }),
            };
        });
    }

    /// The monitor: reconcile on every enabled-set emission and on a
    /// fixed period.
    async fn run_monitor(
        self: Arc<Self>,
        mut enabled: watch::Receiver<Vec<PairedDevice>>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.config.reconcile_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = enabled.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let devices = enabled.borrow_and_update().clone();
                    *self.latest_enabled.lock().expect("enabled cache poisoned") = devices;
                    self.reconcile().await;
                }
                _ = ticker.tick() => self.reconcile().await,
            }
        }
    }

    /// One idempotent pass aligning supervised cameras with the enabled
    /// set. Serialized; per-device waits happen outside the table lock.
    async fn reconcile(self: &Arc<Self>) {
        let _gate = self.reconcile_gate.lock().await;
        self.reconcile_active.store(true, Ordering::SeqCst);
        self.update_scanning();

        let enabled = self
            .latest_enabled
            .lock()
            .expect("enabled cache poisoned")
            .clone();
        let enabled_macs: HashSet<MacAddress> = enabled.iter().map(|d| d.mac).collect();

        let to_stop: Vec<MacAddress> = {
            let table = self.table.lock().await;
            let states = self.states_tx.borrow();
            table
                .jobs
                .keys()
                .copied()
                .filter(|mac| !enabled_macs.contains(mac))
                .filter(|mac| states.get(mac).is_some_and(DeviceConnectionState::is_engaged))
                .collect()
        };
        for mac in to_stop {
            self.stop_device_sync(mac).await;
        }

        for device in enabled {
            let startable = self
                .states_tx
                .borrow()
                .get(&device.mac)
                .is_none_or(DeviceConnectionState::is_startable);
            if startable {
                self.start_device_sync(&device).await;
            }
        }

        self.reconcile_active.store(false, Ordering::SeqCst);
        self.update_scanning();
    }

    fn set_state(&self, mac: MacAddress, state: DeviceConnectionState) {
        self.states_tx.send_modify(|states| {
            states.insert(mac, state);
        });
        self.update_scanning();
    }

    /// One-shot `Searching → Connecting` advance, fired from the
    /// transport's found callback on an arbitrary thread.
    fn advance_to_connecting(&self, mac: MacAddress) {
        self.states_tx.send_modify(|states| {
            if matches!(states.get(&mac), Some(DeviceConnectionState::Searching)) {
                states.insert(mac, DeviceConnectionState::Connecting);
            }
        });
        self.update_scanning();
    }

    fn update_scanning(&self) {
        let engaged = self.states_tx.borrow().values().any(|state| {
            matches!(
                state,
                DeviceConnectionState::Searching | DeviceConnectionState::Connecting
            )
        });
        let scanning = engaged || self.reconcile_active.load(Ordering::SeqCst);
        self.scanning_tx.send_if_modified(|current| {
            if *current == scanning {
                false
            } else {
                *current = scanning;
                true
            }
        });
    }
}

/// Maps a transport failure onto the message shown to the user.
fn user_message(err: BleError) -> String {
    let classified = match err {
        BleError::Transport(raw) => BleError::classify_message(raw),
        other => other,
    };
    match classified {
        BleError::PairingRejected => {
            String::from("Pairing rejected. Enable pairing on your camera.")
        }
        BleError::Timeout => String::from("Connection timed out. Is the camera nearby?"),
        BleError::Transport(raw) => raw,
        other => other.to_string(),
    }
}
