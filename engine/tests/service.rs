//! Host-surface scenarios: the service follows the store's flows and
//! executes host commands.

mod support;

use std::time::Duration;

use camsync_engine::{ServiceCommand, SyncService};
use camsync_location::LocationSource;
use camsync_types::{Camera, DeviceConnectionState as State};

use support::{harness, mac, paired, wait_for_state, wait_until};

#[tokio::test(start_paused = true)]
async fn service_follows_the_enabled_flow() {
    let h = harness();
    let device = paired(1);
    let service = SyncService::start(h.coordinator.clone(), h.store.clone());
    let mut states = service.device_states();

    // Pairing an enabled camera brings it up without any command.
    h.store.add(device.clone()).unwrap();
    wait_for_state(&mut states, device.mac, |s| {
        matches!(s, State::Syncing { .. })
    })
    .await;

    // The global toggle gates everything.
    h.store.set_sync_enabled(false).unwrap();
    wait_for_state(&mut states, device.mac, |s| *s == State::Disconnected).await;
    wait_until(|| !h.source.is_producing()).await;

    h.store.set_sync_enabled(true).unwrap();
    wait_for_state(&mut states, device.mac, |s| {
        matches!(s, State::Syncing { .. })
    })
    .await;

    service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unpairing_stops_the_camera() {
    let h = harness();
    let device = paired(1);
    h.store.add(device.clone()).unwrap();
    let service = SyncService::start(h.coordinator.clone(), h.store.clone());
    let mut states = service.device_states();

    wait_for_state(&mut states, device.mac, |s| {
        matches!(s, State::Syncing { .. })
    })
    .await;

    h.store.remove(device.mac).unwrap();
    wait_for_state(&mut states, device.mac, |s| *s == State::Disconnected).await;
    assert_eq!(h.collector.registered_count(), 0);

    service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn pairing_and_unpairing_round_trip() {
    let h = harness();
    let service = SyncService::start(h.coordinator.clone(), h.store.clone());
    let mut states = service.device_states();

    // A camera fresh out of discovery.
    let camera = Camera {
        mac: mac(7),
        name: Some("GR IIIx".into()),
        vendor_id: "ricoh".into(),
    };
    service.pair_camera(&camera).unwrap();

    assert!(h.store.is_paired(camera.mac));
    wait_for_state(&mut states, camera.mac, |s| {
        matches!(s, State::Syncing { .. })
    })
    .await;

    service.unpair_camera(camera.mac).await.unwrap();

    assert!(!h.store.is_paired(camera.mac));
    wait_until(|| !states.borrow().contains_key(&mac(7))).await;
    assert_eq!(h.collector.registered_count(), 0);
    assert_eq!(h.transport.link_for(camera.mac).disconnects(), 1);

    service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn host_commands_drive_the_coordinator() {
    let h = harness();
    // Global sync off: nothing starts on its own.
    h.store.set_sync_enabled(false).unwrap();
    let device = paired(1);
    h.store.add(device.clone()).unwrap();

    let service = SyncService::start(h.coordinator.clone(), h.store.clone());
    let mut states = service.device_states();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.transport.connects(), 0);

    // A manual connect works even while background sync is off.
    service.dispatch(ServiceCommand::ConnectDevice(device.clone()));
    wait_for_state(&mut states, device.mac, |s| {
        matches!(s, State::Syncing { .. })
    })
    .await;

    service.dispatch(ServiceCommand::DisconnectDevice(device.mac));
    wait_for_state(&mut states, device.mac, |s| *s == State::Disconnected).await;

    service.dispatch(ServiceCommand::StopAll);
    wait_until(|| h.collector.registered_count() == 0).await;

    service.stop().await;
}
