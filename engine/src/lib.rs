//! The multi-device sync coordinator.
//!
//! [`DeviceSyncCoordinator`] supervises one background task per enabled
//! camera: it scans, connects with a wall-clock deadline, runs the vendor
//! handshake (firmware read, paired name, clock, geo-tagging flag), then
//! holds the connection open and watches its liveness. A single lazy
//! fan-out task broadcasts every GPS fix from the shared
//! [`LocationCollector`](camsync_location::LocationCollector) to all live
//! connections, and a background monitor reconciles the supervised set
//! against the store's enabled devices every minute.
//!
//! [`SyncService`] is the thin host-facing adapter: it wires the store's
//! flows into the coordinator and executes host commands.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

mod coordinator;
mod service;

pub use coordinator::DeviceSyncCoordinator;
pub use service::{ServiceCommand, SyncService};

/// Provider of the name a camera displays for this pairing, e.g.
/// `"Pixel 9 camsync"`. Pure: called once per handshake.
pub type PairedNameProvider = Arc<dyn Fn() -> String + Send + Sync>;

/// Policy knobs for the coordinator.
///
/// The defaults match the shipped behavior: a 30 second connect deadline
/// and a 60 second reconcile period. Neither is load-bearing for
/// correctness; reconcile simply retries on the next period.
#[derive(Clone)]
pub struct CoordinatorConfig {
    /// Wall-clock deadline for one connect attempt.
    pub connect_deadline: Duration,
    /// Period of the background reconcile ticker.
    pub reconcile_period: Duration,
    /// Provides the paired-device name written during the handshake.
    pub paired_name: PairedNameProvider,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            connect_deadline: Duration::from_secs(30),
            reconcile_period: Duration::from_secs(60),
            paired_name: Arc::new(|| String::from("camsync")),
        }
    }
}

impl fmt::Debug for CoordinatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorConfig")
            .field("connect_deadline", &self.connect_deadline)
            .field("reconcile_period", &self.reconcile_period)
            .finish_non_exhaustive()
    }
}
