//! GPS fix production for the sync engine.
//!
//! The OS fused-location stack sits behind the [`LocationSource`] trait; the
//! [`LocationCollector`] reference-counts device subscriptions on top of it
//! so the source produces exactly while at least one camera wants fixes.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use camsync_types::GpsLocation;

mod collector;
mod throttle;

pub use collector::LocationCollector;
pub use throttle::ThrottledLocationSource;

/// Result type used by the location crate.
pub type LocationResult<T> = Result<T, LocationError>;

/// Errors produced by location sources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// No location source is available on this host.
    #[error("location source is unavailable")]
    SourceUnavailable,
    /// The underlying platform reported an error.
    #[error("platform error: {0}")]
    Platform(String),
}

/// Cadence and displacement policy for a location source.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSourceConfig {
    /// How often the source should deliver a fix.
    pub interval: Duration,
    /// Minimum movement in meters before a new fix is delivered.
    pub min_displacement_m: f64,
}

impl Default for LocationSourceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            min_displacement_m: 0.0,
        }
    }
}

/// A producer of GPS fixes, typically a thin wrapper over the OS fused
/// location API.
///
/// `start` and `stop` are idempotent: starting a producing source or
/// stopping an idle one is a no-op.
pub trait LocationSource: Send + Sync + 'static {
    /// Begins producing fixes.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses to deliver location
    /// updates (missing hardware, revoked permission).
    fn start(&self) -> LocationResult<()>;

    /// Stops producing fixes.
    fn stop(&self);

    /// The latest fix, seeded `None` until the first one arrives.
    fn updates(&self) -> watch::Receiver<Option<GpsLocation>>;

    /// Whether the source is currently producing.
    fn is_producing(&self) -> bool;
}
