//! Shared fakes for the coordinator scenarios: an in-memory BLE transport,
//! a scriptable GATT link per camera, and a hand-driven location source.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use tempfile::TempDir;
use tokio::sync::watch;
use uuid::Uuid;

use camsync_ble::{
    Advertisement, AdvertisementStream, BleError, BleResult, BleTransport, FoundCallback, GattLink,
};
use camsync_engine::{CoordinatorConfig, DeviceSyncCoordinator};
use camsync_location::{LocationCollector, LocationResult, LocationSource};
use camsync_store::PairedDevicesStore;
use camsync_types::{
    Camera, CameraCapabilities, DeviceConnectionState, GpsLocation, MacAddress, PairedDevice,
    VendorId,
};
use camsync_vendor::{CharacteristicSpec, CodecResult, GattProfile, Ricoh, Vendor, VendorRegistry};

/// A vendor whose cameras take clock and geo-tag writes but no location
/// stream. Shares the Ricoh GATT layout and codecs.
#[derive(Debug)]
pub struct ClockOnlyVendor;

impl ClockOnlyVendor {
    pub const ID: &'static str = "clockonly";
}

impl Vendor for ClockOnlyVendor {
    fn id(&self) -> VendorId {
        VendorId::new(Self::ID)
    }

    fn display_name(&self) -> &str {
        "ClockOnly"
    }

    fn capabilities(&self) -> CameraCapabilities {
        CameraCapabilities {
            writes_location: false,
            ..Ricoh.capabilities()
        }
    }

    fn profile(&self) -> &GattProfile {
        static RICOH: Ricoh = Ricoh;
        RICOH.profile()
    }

    fn encode_date_time(&self, time: chrono::NaiveDateTime) -> CodecResult<Vec<u8>> {
        Ricoh.encode_date_time(time)
    }

    fn decode_date_time(&self, payload: &[u8]) -> CodecResult<chrono::NaiveDateTime> {
        Ricoh.decode_date_time(payload)
    }

    fn encode_geo_tagging(&self, enabled: bool) -> CodecResult<Vec<u8>> {
        Ricoh.encode_geo_tagging(enabled)
    }

    fn decode_geo_tagging(&self, payload: &[u8]) -> CodecResult<bool> {
        Ricoh.decode_geo_tagging(payload)
    }
}

/// Registry with both the Ricoh vendor and the clock-only one.
pub fn clock_only_registry() -> Arc<VendorRegistry> {
    Arc::new(VendorRegistry::new(vec![
        Arc::new(Ricoh) as Arc<dyn Vendor>,
        Arc::new(ClockOnlyVendor),
    ]))
}

/// One scriptable GATT link.
pub struct FakeLink {
    connected: watch::Sender<bool>,
    values: Mutex<HashMap<Uuid, Vec<u8>>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    reads: AtomicUsize,
    disconnects: AtomicUsize,
    /// Flip the link down after this many reads have completed.
    drop_after_reads: Mutex<Option<usize>>,
}

impl FakeLink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: watch::channel(false).0,
            values: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            drop_after_reads: Mutex::new(None),
        })
    }

    pub fn set_connected(&self, up: bool) {
        self.connected.send_replace(up);
    }

    pub fn is_up(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn set_value(&self, characteristic: Uuid, value: &[u8]) {
        self.values
            .lock()
            .unwrap()
            .insert(characteristic, value.to_vec());
    }

    pub fn drop_link_after_reads(&self, reads: usize) {
        *self.drop_after_reads.lock().unwrap() = Some(reads);
    }

    /// Every payload written to one characteristic, in write order.
    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == characteristic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn total_writes(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GattLink for FakeLink {
    async fn read(&self, spec: &CharacteristicSpec) -> BleResult<Vec<u8>> {
        let value = self
            .values
            .lock()
            .unwrap()
            .get(&spec.characteristic)
            .cloned()
            .unwrap_or_default();
        let completed = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.drop_after_reads.lock().unwrap() == Some(completed) {
            self.set_connected(false);
        }
        Ok(value)
    }

    async fn write(&self, spec: &CharacteristicSpec, payload: &[u8]) -> BleResult<()> {
        self.writes
            .lock()
            .unwrap()
            .push((spec.characteristic, payload.to_vec()));
        self.values
            .lock()
            .unwrap()
            .insert(spec.characteristic, payload.to_vec());
        Ok(())
    }

    fn is_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    async fn disconnect(&self) -> BleResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.set_connected(false);
        Ok(())
    }
}

/// In-memory transport handing out one [`FakeLink`] per address.
pub struct FakeTransport {
    links: Mutex<HashMap<MacAddress, Arc<FakeLink>>>,
    connect_delay: Mutex<Duration>,
    connect_error: Mutex<Option<BleError>>,
    connects: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            links: Mutex::new(HashMap::new()),
            connect_delay: Mutex::new(Duration::ZERO),
            connect_error: Mutex::new(None),
            connects: AtomicUsize::new(0),
        })
    }

    /// The link `connect` will hand out for this address, creating it on
    /// first use so tests can preload characteristic values.
    pub fn link_for(&self, mac: MacAddress) -> Arc<FakeLink> {
        self.links
            .lock()
            .unwrap()
            .entry(mac)
            .or_insert_with(FakeLink::new)
            .clone()
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = delay;
    }

    pub fn fail_connects_with(&self, err: BleError) {
        *self.connect_error.lock().unwrap() = Some(err);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleTransport for FakeTransport {
    fn scan(&self) -> AdvertisementStream {
        stream::pending::<Advertisement>().boxed()
    }

    async fn connect(
        &self,
        camera: &Camera,
        on_found: Option<FoundCallback>,
    ) -> BleResult<Arc<dyn GattLink>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(callback) = on_found {
            callback();
        }
        let delay = *self.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.connect_error.lock().unwrap().clone() {
            return Err(err);
        }
        let link = self.link_for(camera.mac);
        link.set_connected(true);
        Ok(link)
    }
}

/// Location source driven by the test.
pub struct FakeSource {
    updates: watch::Sender<Option<GpsLocation>>,
    producing: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            updates: watch::channel(None).0,
            producing: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn emit(&self, fix: GpsLocation) {
        self.updates.send_replace(Some(fix));
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl LocationSource for FakeSource {
    fn start(&self) -> LocationResult<()> {
        if !self.producing.swap(true, Ordering::SeqCst) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn stop(&self) {
        if self.producing.swap(false, Ordering::SeqCst) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn updates(&self) -> watch::Receiver<Option<GpsLocation>> {
        self.updates.subscribe()
    }

    fn is_producing(&self) -> bool {
        self.producing.load(Ordering::SeqCst)
    }
}

/// Everything a scenario needs, wired together.
pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub source: Arc<FakeSource>,
    pub collector: Arc<LocationCollector>,
    pub store: Arc<PairedDevicesStore>,
    pub coordinator: DeviceSyncCoordinator,
    _dir: TempDir,
}

pub fn harness() -> Harness {
    harness_with(CoordinatorConfig::default())
}

pub fn harness_with(config: CoordinatorConfig) -> Harness {
    build(config, Arc::new(VendorRegistry::default()))
}

pub fn harness_with_registry(registry: Arc<VendorRegistry>) -> Harness {
    build(CoordinatorConfig::default(), registry)
}

fn build(config: CoordinatorConfig, registry: Arc<VendorRegistry>) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let source = FakeSource::new();
    let collector = Arc::new(LocationCollector::new(source.clone()));
    let store = Arc::new(PairedDevicesStore::open(dir.path().join("devices.json")).unwrap());
    let coordinator = DeviceSyncCoordinator::new(
        transport.clone(),
        registry,
        collector.clone(),
        store.clone(),
        config,
    );
    Harness {
        transport,
        source,
        collector,
        store,
        coordinator,
        _dir: dir,
    }
}

pub fn mac(last: u8) -> MacAddress {
    MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, last])
}

pub fn paired(last: u8) -> PairedDevice {
    PairedDevice {
        mac: mac(last),
        name: Some(format!("GR III #{last:02X}")),
        vendor_id: VendorId::new(Ricoh::ID),
        enabled: true,
        last_synced_at: None,
    }
}

pub fn fix(latitude: f64) -> GpsLocation {
    GpsLocation {
        latitude,
        longitude: -122.4194,
        altitude: 10.0,
        horizontal_accuracy: None,
        timestamp: "2024-12-25T14:30:00Z".parse().unwrap(),
    }
}

/// The characteristic a Ricoh value lands on.
pub fn ricoh_char(pick: fn(&camsync_vendor::GattProfile) -> CharacteristicSpec) -> Uuid {
    pick(Ricoh.profile()).characteristic
}

/// Waits until the published state for `mac` satisfies the predicate.
/// Panics after a (virtual) minute.
pub async fn wait_for_state(
    states: &mut watch::Receiver<HashMap<MacAddress, DeviceConnectionState>>,
    mac: MacAddress,
    predicate: impl Fn(&DeviceConnectionState) -> bool,
) -> DeviceConnectionState {
    let result = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if let Some(state) = states.borrow_and_update().get(&mac) {
                if predicate(state) {
                    return state.clone();
                }
            }
            states.changed().await.expect("state channel closed");
        }
    })
    .await;
    match result {
        Ok(state) => state,
        Err(_) => panic!(
            "state for {mac} never matched; last was {:?}",
            states.borrow().get(&mac)
        ),
    }
}

/// Polls an arbitrary condition until it holds. Panics after a (virtual)
/// minute.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}
