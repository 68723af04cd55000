//! Reference-counted fan-in of device subscriptions to the GPS source.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::debug;
use tokio::sync::watch;

use camsync_types::{GpsLocation, MacAddress};

use crate::{LocationResult, LocationSource};

/// Shares one [`LocationSource`] across any number of devices.
///
/// Devices register by MAC address (set semantics, duplicates coalesce).
/// The source is started on the 0→1 transition and stopped on 1→0; the
/// registration set's lock is held across both decisions, so a start can
/// never be lost to a racing stop.
pub struct LocationCollector {
    source: Arc<dyn LocationSource>,
    registered: Mutex<HashSet<MacAddress>>,
}

impl LocationCollector {
    /// Creates a collector over the given source.
    #[must_use]
    pub fn new(source: Arc<dyn LocationSource>) -> Self {
        Self {
            source,
            registered: Mutex::new(HashSet::new()),
        }
    }

    /// Registers a device. Starts the source if this is the first one.
    ///
    /// # Errors
    ///
    /// Propagates the source's start error; the registration is rolled
    /// back so a later attempt sees the 0→1 transition again.
    pub fn register_device(&self, mac: MacAddress) -> LocationResult<()> {
        let mut registered = self.registered.lock().expect("registration set poisoned");
        if !registered.insert(mac) {
            return Ok(());
        }
        if registered.len() == 1 {
            debug!("first device registered, starting location source");
            if let Err(err) = self.source.start() {
                registered.remove(&mac);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Unregisters a device. Stops the source if it was the last one.
    pub fn unregister_device(&self, mac: MacAddress) {
        let mut registered = self.registered.lock().expect("registration set poisoned");
        if registered.remove(&mac) && registered.is_empty() {
            debug!("last device unregistered, stopping location source");
            self.source.stop();
        }
    }

    /// Whether the device is currently registered.
    #[must_use]
    pub fn is_registered(&self, mac: MacAddress) -> bool {
        self.registered
            .lock()
            .expect("registration set poisoned")
            .contains(&mac)
    }

    /// Exact number of registered devices.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.registered
            .lock()
            .expect("registration set poisoned")
            .len()
    }

    /// The latest fix from the shared source, seeded `None`.
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<Option<GpsLocation>> {
        self.source.updates()
    }
}

impl std::fmt::Debug for LocationCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationCollector")
            .field("registered_count", &self.registered_count())
            .finish_non_exhaustive()
    }
}
