//! Typed camera operations over a raw GATT link.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::watch;

use camsync_types::{CameraCapabilities, GpsLocation};
use camsync_vendor::Vendor;

use crate::{BleError, BleResult, GattLink};

/// A connection to one camera, combining the raw link with the camera's
/// vendor descriptor.
///
/// Every operation checks the liveness signal at entry and fails with
/// [`BleError::LinkLost`] without touching the OS stack when the link is
/// down; writing into a torn-down GATT handle is never attempted.
pub struct CameraConnection {
    link: Arc<dyn GattLink>,
    vendor: Arc<dyn Vendor>,
}

impl CameraConnection {
    /// Wraps a discovered link for the given vendor.
    #[must_use]
    pub fn new(link: Arc<dyn GattLink>, vendor: Arc<dyn Vendor>) -> Self {
        Self { link, vendor }
    }

    /// The camera's vendor descriptor.
    #[must_use]
    pub fn vendor(&self) -> &Arc<dyn Vendor> {
        &self.vendor
    }

    /// Liveness signal: `true` while the GATT link is up.
    #[must_use]
    pub fn is_connected(&self) -> watch::Receiver<bool> {
        self.link.is_connected()
    }

    fn capabilities(&self) -> CameraCapabilities {
        self.vendor.capabilities()
    }

    fn ensure_connected(&self) -> BleResult<()> {
        if *self.link.is_connected().borrow() {
            Ok(())
        } else {
            Err(BleError::LinkLost)
        }
    }

    fn ensure_supported(supported: bool, operation: &'static str) -> BleResult<()> {
        if supported {
            Ok(())
        } else {
            Err(BleError::Unsupported { operation })
        }
    }

    /// Reads the camera's firmware version string.
    ///
    /// # Errors
    ///
    /// Fails with [`BleError::Unsupported`] when the vendor cannot read
    /// firmware versions, [`BleError::LinkLost`] on a down link, or any
    /// transport error from the read itself.
    pub async fn read_firmware_version(&self) -> BleResult<String> {
        Self::ensure_supported(
            self.capabilities().reads_firmware_version,
            "read_firmware_version",
        )?;
        self.ensure_connected()?;
        let bytes = self.link.read(&self.vendor.profile().firmware_version).await?;
        Ok(String::from_utf8_lossy(&bytes)
            .trim_end_matches('\0')
            .trim()
            .to_owned())
    }

    /// Writes the name the camera shows for this pairing.
    ///
    /// # Errors
    ///
    /// Fails with [`BleError::Unsupported`], [`BleError::LinkLost`], or a
    /// transport error.
    pub async fn set_paired_device_name(&self, name: &str) -> BleResult<()> {
        Self::ensure_supported(
            self.capabilities().writes_paired_device_name,
            "set_paired_device_name",
        )?;
        self.ensure_connected()?;
        self.link
            .write(&self.vendor.profile().paired_device_name, name.as_bytes())
            .await
    }

    /// Writes the camera's wall clock.
    ///
    /// # Errors
    ///
    /// Fails with [`BleError::Unsupported`], [`BleError::LinkLost`], a
    /// codec error, or a transport error.
    pub async fn sync_date_time(&self, time: NaiveDateTime) -> BleResult<()> {
        Self::ensure_supported(self.capabilities().writes_date_time, "sync_date_time")?;
        self.ensure_connected()?;
        let payload = self.vendor.encode_date_time(time)?;
        self.link
            .write(&self.vendor.profile().date_time, &payload)
            .await
    }

    /// Reads the camera's current wall clock.
    ///
    /// # Errors
    ///
    /// Fails with [`BleError::Unsupported`], [`BleError::LinkLost`], a
    /// codec error, or a transport error.
    pub async fn read_date_time(&self) -> BleResult<NaiveDateTime> {
        Self::ensure_supported(self.capabilities().writes_date_time, "read_date_time")?;
        self.ensure_connected()?;
        let bytes = self.link.read(&self.vendor.profile().date_time).await?;
        Ok(self.vendor.decode_date_time(&bytes)?)
    }

    /// Toggles in-camera geo-tagging.
    ///
    /// # Errors
    ///
    /// Fails with [`BleError::Unsupported`], [`BleError::LinkLost`], or a
    /// transport error.
    pub async fn set_geo_tagging_enabled(&self, enabled: bool) -> BleResult<()> {
        Self::ensure_supported(
            self.capabilities().toggles_geo_tagging,
            "set_geo_tagging_enabled",
        )?;
        self.ensure_connected()?;
        let payload = self.vendor.encode_geo_tagging(enabled)?;
        self.link
            .write(&self.vendor.profile().geo_tagging, &payload)
            .await
    }

    /// Reads the in-camera geo-tagging flag.
    ///
    /// # Errors
    ///
    /// Fails with [`BleError::Unsupported`], [`BleError::LinkLost`], a
    /// codec error, or a transport error.
    pub async fn is_geo_tagging_enabled(&self) -> BleResult<bool> {
        Self::ensure_supported(
            self.capabilities().toggles_geo_tagging,
            "is_geo_tagging_enabled",
        )?;
        self.ensure_connected()?;
        let bytes = self.link.read(&self.vendor.profile().geo_tagging).await?;
        Ok(self.vendor.decode_geo_tagging(&bytes)?)
    }

    /// Writes a GPS fix to the camera.
    ///
    /// # Errors
    ///
    /// Fails with [`BleError::Unsupported`], [`BleError::LinkLost`], a
    /// codec error, or a transport error.
    pub async fn sync_location(&self, fix: &GpsLocation) -> BleResult<()> {
        Self::ensure_supported(self.capabilities().writes_location, "sync_location")?;
        self.ensure_connected()?;
        let payload = self.vendor.encode_location(fix)?;
        self.link
            .write(&self.vendor.profile().location, &payload)
            .await
    }

    /// Tears the link down.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the OS stack refuses the teardown.
    pub async fn disconnect(&self) -> BleResult<()> {
        self.link.disconnect().await
    }
}

impl std::fmt::Debug for CameraConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraConnection")
            .field("vendor", &self.vendor.id())
            .field("connected", &*self.link.is_connected().borrow())
            .finish_non_exhaustive()
    }
}
