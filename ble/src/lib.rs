//! The BLE seam of the sync engine.
//!
//! The OS Bluetooth stack (scanning, GATT I/O, bonding) sits behind two
//! object-safe traits: [`BleTransport`] for discovery and connection
//! establishment, and [`GattLink`] for raw characteristic I/O on a live
//! peripheral. On top of the raw link, [`CameraConnection`] exposes the
//! typed camera operations, encoding values through the camera's vendor
//! codec and refusing every operation up front when the link is down;
//! [`CameraScanner`] turns raw advertisements into recognized cameras for
//! the pairing flow.

use thiserror::Error;
use uuid::Uuid;

use camsync_types::MacAddress;
use camsync_vendor::CodecError;

mod connection;
mod scanner;
mod transport;

pub use connection::CameraConnection;
pub use scanner::CameraScanner;
pub use transport::{AdvertisementStream, BleTransport, FoundCallback, GattLink};

/// Result type used by the BLE crate.
pub type BleResult<T> = Result<T, BleError>;

/// Errors produced by the transport and connection layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BleError {
    /// The GATT link is down; the operation never reached the OS stack.
    #[error("link to the peripheral is down")]
    LinkLost,
    /// The operation did not complete within its deadline.
    #[error("operation timed out")]
    Timeout,
    /// The peer refused bonding.
    #[error("peer rejected pairing")]
    PairingRejected,
    /// The camera's vendor does not implement this operation.
    #[error("operation `{operation}` is not supported by this camera")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: &'static str,
    },
    /// A wire value could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Any other scan or GATT failure; recoverable by a later retry.
    #[error("transport error: {0}")]
    Transport(String),
}

impl BleError {
    /// Maps a backend's raw error string onto a typed error.
    ///
    /// Backends with typed failures should construct variants directly;
    /// this shim exists for OS stacks that only surface strings, keyed on
    /// the conventional "pairing"/"timeout" wording.
    pub fn classify_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("pairing") {
            Self::PairingRejected
        } else if lower.contains("timeout") {
            Self::Timeout
        } else {
            Self::Transport(message)
        }
    }
}

/// A discovered peripheral's broadcast packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Address of the advertising peripheral.
    pub mac: MacAddress,
    /// Advertised local name, when broadcast.
    pub local_name: Option<String>,
    /// Service ids carried in the advertisement.
    pub services: Vec<Uuid>,
}
