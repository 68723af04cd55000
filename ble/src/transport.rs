//! Traits implemented by OS Bluetooth backends.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::ready;
use futures::stream::BoxStream;
use tokio::sync::watch;

use camsync_types::{Camera, MacAddress};
use camsync_vendor::CharacteristicSpec;

use crate::{Advertisement, BleResult};

/// An infinite stream of advertisements; ends only when dropped.
pub type AdvertisementStream = BoxStream<'static, Advertisement>;

/// One-shot signal fired when the peripheral being connected to has been
/// observed over the air. Must be invokable from any thread and must not
/// block.
pub type FoundCallback = Box<dyn FnOnce() + Send>;

/// A live GATT connection to one peripheral.
///
/// Writes are always performed with response. The link reports its
/// up/down transitions through a watch channel so owners can both check
/// the current value and await the next flip.
#[async_trait]
pub trait GattLink: Send + Sync {
    /// Reads a characteristic's value.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::BleError`] if the read fails or the link is down.
    async fn read(&self, spec: &CharacteristicSpec) -> BleResult<Vec<u8>>;

    /// Writes a characteristic's value, with response.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::BleError`] if the write fails or the link is down.
    async fn write(&self, spec: &CharacteristicSpec, payload: &[u8]) -> BleResult<()>;

    /// Liveness signal: `true` while the GATT link is up.
    fn is_connected(&self) -> watch::Receiver<bool>;

    /// Tears the link down.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::BleError`] if the OS stack refuses the teardown.
    async fn disconnect(&self) -> BleResult<()>;
}

/// Scan and connection capability of an OS Bluetooth backend.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Starts a scan and yields advertisements as they arrive.
    fn scan(&self) -> AdvertisementStream;

    /// Like [`BleTransport::scan`], filtered to a single address.
    fn find_by_address(&self, mac: MacAddress) -> AdvertisementStream {
        self.scan().filter(move |adv| ready(adv.mac == mac)).boxed()
    }

    /// Acquires a peripheral handle for the camera.
    ///
    /// `on_found` fires once as soon as the underlying device has been
    /// seen; the returned link is handed back only after GATT discovery
    /// has completed.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::BleError`] if the device cannot be reached,
    /// refuses pairing, or discovery fails.
    async fn connect(
        &self,
        camera: &Camera,
        on_found: Option<FoundCallback>,
    ) -> BleResult<Arc<dyn GattLink>>;
}
