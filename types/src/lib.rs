//! Shared value types for the camsync BLE camera sync engine.
//!
//! Everything in this crate is a plain immutable value: device identities,
//! GPS fixes, capability records and the per-device connection state that
//! the coordinator publishes to its host.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod mac;
pub use mac::{MacAddress, MacParseError};

/// Identifier of a camera vendor, e.g. `"ricoh"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VendorId(String);

impl VendorId {
    /// Creates a vendor id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VendorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A discovered or paired camera.
///
/// Created by discovery (from an advertisement) or by rehydrating a
/// [`PairedDevice`]; immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Camera {
    /// Stable peripheral address.
    pub mac: MacAddress,
    /// Advertised or stored display name, when known.
    pub name: Option<String>,
    /// The vendor this camera belongs to.
    pub vendor_id: VendorId,
}

impl Camera {
    /// Rehydrates a camera from its persisted record.
    #[must_use]
    pub fn from_paired(device: &PairedDevice) -> Self {
        Self {
            mac: device.mac,
            name: device.name.clone(),
            vendor_id: device.vendor_id.clone(),
        }
    }
}

/// Persisted record of a paired camera.
///
/// Identity is the MAC address; two records with the same address refer to
/// the same camera. Only the paired-devices store mutates these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairedDevice {
    /// Stable peripheral address (unique key).
    pub mac: MacAddress,
    /// Display name, when known.
    #[serde(default)]
    pub name: Option<String>,
    /// The vendor this camera belongs to.
    pub vendor_id: VendorId,
    /// Whether background sync is enabled for this camera.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Epoch milliseconds of the last successful location write.
    #[serde(default)]
    pub last_synced_at: Option<i64>,
}

fn default_enabled() -> bool {
    true
}

impl PartialEq for PairedDevice {
    fn eq(&self, other: &Self) -> bool {
        self.mac == other.mac
    }
}

impl Eq for PairedDevice {}

/// The set of operations a camera vendor implements.
///
/// Immutable per vendor; every unsupported operation fails rather than
/// being silently skipped at the codec level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraCapabilities {
    /// The firmware version characteristic can be read.
    pub reads_firmware_version: bool,
    /// The paired-device name characteristic can be written.
    pub writes_paired_device_name: bool,
    /// The camera clock can be written.
    pub writes_date_time: bool,
    /// The geo-tagging flag can be toggled.
    pub toggles_geo_tagging: bool,
    /// Location fixes can be written.
    pub writes_location: bool,
}

impl CameraCapabilities {
    /// A vendor that implements none of the operations.
    pub const NONE: Self = Self {
        reads_firmware_version: false,
        writes_paired_device_name: false,
        writes_date_time: false,
        toggles_geo_tagging: false,
        writes_location: false,
    };
}

/// A single GPS sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsLocation {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters above sea level.
    pub altitude: f64,
    /// Horizontal accuracy in meters, when the source reports one.
    pub horizontal_accuracy: Option<f64>,
    /// When the fix was taken.
    pub timestamp: DateTime<Utc>,
}

impl GpsLocation {
    /// Great-circle distance to another fix in meters (haversine over a
    /// spherical earth; altitude is ignored).
    #[must_use]
    pub fn distance_m(&self, other: &Self) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// Record of the most recent successful location write to a camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSyncInfo {
    /// When the write completed.
    pub synced_at: DateTime<Utc>,
    /// The fix that was written.
    pub location: GpsLocation,
}

/// Connection state of a single camera, as published by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceConnectionState {
    /// Sync is disabled for this camera.
    Disabled,
    /// No connection and no attempt in progress.
    Disconnected,
    /// Scanning for the camera's advertisement.
    Searching,
    /// The peripheral was seen; connection and discovery in progress.
    Connecting,
    /// Connected and handshaken, no fix written yet.
    Connected {
        /// Firmware version read during the handshake, when supported.
        #[serde(default)]
        firmware: Option<String>,
    },
    /// Connected and actively receiving location fixes.
    Syncing {
        /// Firmware version read during the handshake, when supported.
        #[serde(default)]
        firmware: Option<String>,
        /// The most recent successful location write.
        #[serde(default)]
        last_sync: Option<LocationSyncInfo>,
    },
    /// The camera could not be reached within the connect deadline.
    Unreachable,
    /// The last attempt failed.
    Error {
        /// User-facing description of the failure.
        message: String,
        /// Whether a retry can succeed without user intervention.
        recoverable: bool,
    },
}

impl DeviceConnectionState {
    /// Whether a supervising task is engaged with this camera
    /// (searching, connecting, or holding a live connection).
    #[must_use]
    pub fn is_engaged(&self) -> bool {
        matches!(
            self,
            Self::Searching | Self::Connecting | Self::Connected { .. } | Self::Syncing { .. }
        )
    }

    /// Whether a new connection attempt may be started from this state.
    #[must_use]
    pub fn is_startable(&self) -> bool {
        matches!(
            self,
            Self::Disconnected
                | Self::Unreachable
                | Self::Error {
                    recoverable: true,
                    ..
                }
        )
    }

    /// Whether this is a failure state that an explicit retry may leave.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable
                | Self::Error {
                    recoverable: true,
                    ..
                }
        )
    }
}
