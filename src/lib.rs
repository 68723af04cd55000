//! # camsync
//!
//! A background sync engine that keeps the wall clock and GPS position of
//! one or more Bluetooth Low Energy cameras aligned with the host device.
//!
//! The engine discovers paired cameras, maintains one independent
//! connection per camera, performs the vendor handshake (clock, paired
//! name, geo-tagging flag) and then streams every GPS fix to all connected
//! cameras through vendor-specific wire codecs.
//!
//! ## Features
//!
//! camsync is modular. Enable only the layers you need:
//!
//! - `types`: shared value types (MAC addresses, fixes, device states).
//! - `vendor`: vendor descriptors, GATT profiles and wire codecs.
//! - `ble`: the BLE transport seam and the camera connection surface.
//! - `location`: the GPS source seam and the reference-counted collector.
//! - `store`: the durable paired-devices store.
//! - `engine`: the multi-device coordinator and host service surface.
//!
//! Use the `full` feature to enable everything.
//!
//! ## Example
//!
//! ```toml
//! [dependencies]
//! camsync = { version = "0.1", features = ["full"] }
//! ```
//!
//! ```ignore
//! use camsync::engine::DeviceSyncCoordinator;
//!
//! let coordinator = DeviceSyncCoordinator::new(
//!     transport,
//!     registry,
//!     collector,
//!     store,
//!     Default::default(),
//! );
//! coordinator.start_background_monitoring(enabled_devices);
//! ```

#[cfg(feature = "ble")]
pub use camsync_ble as ble;

#[cfg(feature = "engine")]
pub use camsync_engine as engine;

#[cfg(feature = "location")]
pub use camsync_location as location;

#[cfg(feature = "store")]
pub use camsync_store as store;

#[cfg(feature = "types")]
pub use camsync_types as types;

#[cfg(feature = "vendor")]
pub use camsync_vendor as vendor;
