//! Discovery of nearby cameras for the pairing flow.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use futures::future::ready;
use futures::stream::BoxStream;
use uuid::Uuid;

use camsync_types::{Camera, MacAddress};
use camsync_vendor::{Vendor, VendorRegistry};

use crate::{Advertisement, BleTransport};

/// Turns the transport's raw advertisement stream into a stream of
/// recognized cameras.
pub struct CameraScanner {
    transport: Arc<dyn BleTransport>,
    registry: Arc<VendorRegistry>,
}

impl CameraScanner {
    /// Creates a scanner over the given transport and vendor list.
    #[must_use]
    pub fn new(transport: Arc<dyn BleTransport>, registry: Arc<VendorRegistry>) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// Service ids backends can install as an OS-level scan filter.
    #[must_use]
    pub fn scan_filter(&self) -> Vec<Uuid> {
        self.registry.scan_filter_services()
    }

    /// Infinite stream of cameras recognized by some vendor, one entry
    /// per address. Runs until dropped.
    ///
    /// Advertisements no vendor recognizes are skipped without marking
    /// the address as seen, so a later, richer packet from the same
    /// peripheral (one that carries the name or the service list) can
    /// still surface it.
    pub fn discover(&self) -> BoxStream<'static, Camera> {
        let registry = self.registry.clone();
        let mut seen: HashSet<MacAddress> = HashSet::new();
        self.transport
            .scan()
            .filter_map(move |adv| {
                let camera = registry
                    .identify(adv.local_name.as_deref(), &adv.services)
                    .filter(|_| seen.insert(adv.mac))
                    .map(|vendor| Camera {
                        mac: adv.mac,
                        name: adv.local_name.clone(),
                        vendor_id: vendor.id(),
                    });
                ready(camera)
            })
            .boxed()
    }

    /// Resolves once the peripheral is seen advertising, or never.
    pub async fn await_in_range(&self, mac: MacAddress) -> Option<Advertisement> {
        self.transport.find_by_address(mac).next().await
    }
}

impl std::fmt::Debug for CameraScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraScanner").finish_non_exhaustive()
    }
}
