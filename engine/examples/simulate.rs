//! Runs the sync engine against simulated hardware: one fake camera, a
//! fake GPS source emitting a walk across San Francisco, and a temp-file
//! store. Prints every state transition and every byte that would hit the
//! camera's location characteristic.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p camsync-engine --example simulate
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use camsync_ble::{
    Advertisement, AdvertisementStream, BleResult, BleTransport, FoundCallback, GattLink,
};
use camsync_engine::{CoordinatorConfig, DeviceSyncCoordinator, SyncService};
use camsync_location::{LocationCollector, LocationResult, LocationSource};
use camsync_store::PairedDevicesStore;
use camsync_types::{Camera, GpsLocation, MacAddress, PairedDevice, VendorId};
use camsync_vendor::{CharacteristicSpec, VendorRegistry};

struct SimulatedCamera {
    connected: watch::Sender<bool>,
    values: Mutex<HashMap<uuid::Uuid, Vec<u8>>>,
}

#[async_trait]
impl GattLink for SimulatedCamera {
    async fn read(&self, spec: &CharacteristicSpec) -> BleResult<Vec<u8>> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(&spec.characteristic)
            .cloned()
            .unwrap_or_else(|| b"2.10".to_vec()))
    }

    async fn write(&self, spec: &CharacteristicSpec, payload: &[u8]) -> BleResult<()> {
        println!("  camera <- {} = {payload:02X?}", spec.characteristic);
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
        self.connected.send_replace(false);
        Ok(())
    }
}

struct SimulatedTransport;

#[async_trait]
impl BleTransport for SimulatedTransport {
    fn scan(&self) -> AdvertisementStream {
        use futures::StreamExt;
        futures::stream::pending::<Advertisement>().boxed()
    }

    async fn connect(
        &self,
        camera: &Camera,
        on_found: Option<FoundCallback>,
    ) -> BleResult<Arc<dyn GattLink>> {
        if let Some(found) = on_found {
            found();
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        println!("  transport: connected to {}", camera.mac);
        Ok(Arc::new(SimulatedCamera {
            connected: watch::channel(true).0,
            values: Mutex::new(HashMap::new()),
        }))
    }
}

struct SimulatedGps {
    updates: watch::Sender<Option<GpsLocation>>,
    producing: AtomicBool,
}

impl LocationSource for SimulatedGps {
    fn start(&self) -> LocationResult<()> {
        println!("  gps: started");
        self.producing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        println!("  gps: stopped");
        self.producing.store(false, Ordering::SeqCst);
    }

    fn updates(&self) -> watch::Receiver<Option<GpsLocation>> {
        self.updates.subscribe()
    }

    fn is_producing(&self) -> bool {
        self.producing.load(Ordering::SeqCst)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let gps = Arc::new(SimulatedGps {
        updates: watch::channel(None).0,
        producing: AtomicBool::new(false),
    });
    let dir = tempfile::tempdir().expect("temp dir");
    let store =
        Arc::new(PairedDevicesStore::open(dir.path().join("devices.json")).expect("store"));
    let coordinator = DeviceSyncCoordinator::new(
        Arc::new(SimulatedTransport),
        Arc::new(VendorRegistry::default()),
        Arc::new(LocationCollector::new(gps.clone())),
        store.clone(),
        CoordinatorConfig::default(),
    );

    let mut states = coordinator.device_states();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            for (mac, state) in states.borrow_and_update().iter() {
                println!("state[{mac}] = {state:?}");
            }
        }
    });

    let service = SyncService::start(coordinator, store.clone());
    store
        .add(PairedDevice {
            mac: MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            name: Some("GR III".into()),
            vendor_id: VendorId::new("ricoh"),
            enabled: true,
            last_synced_at: None,
        })
        .expect("pair");

    // A short walk north along the Embarcadero.
    for step in 0..3 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        gps.updates.send_replace(Some(GpsLocation {
            latitude: 37.7749 + f64::from(step) * 0.001,
            longitude: -122.4194,
            altitude: 10.0,
            horizontal_accuracy: Some(5.0),
            timestamp: chrono::Utc::now(),
        }));
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    service.stop().await;
    println!(
        "last synced at: {:?}",
        store
            .get(MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]))
            .and_then(|d| d.last_synced_at)
    );
}
