//! Cadence and displacement throttling on top of a raw source.

use std::sync::{Arc, Mutex};

use log::trace;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use camsync_types::GpsLocation;

use crate::{LocationResult, LocationSource, LocationSourceConfig};

/// Applies a [`LocationSourceConfig`] to a raw source.
///
/// The OS backend may deliver fixes at whatever rate it likes; this
/// wrapper forwards a fix only when the configured interval has elapsed
/// *and* the device has moved at least the minimum displacement since the
/// last forwarded fix (fused-location request semantics). The first fix
/// always passes.
pub struct ThrottledLocationSource {
    inner: Arc<dyn LocationSource>,
    config: LocationSourceConfig,
    out: watch::Sender<Option<GpsLocation>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ThrottledLocationSource {
    /// Wraps a raw source with the given policy.
    #[must_use]
    pub fn new(inner: Arc<dyn LocationSource>, config: LocationSourceConfig) -> Self {
        Self {
            inner,
            config,
            out: watch::channel(None).0,
            pump: Mutex::new(None),
        }
    }
}

impl LocationSource for ThrottledLocationSource {
    fn start(&self) -> LocationResult<()> {
        let mut pump = self.pump.lock().expect("pump slot poisoned");
        if pump.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }
        self.inner.start()?;
        *pump = Some(tokio::spawn(run_pump(
            self.inner.updates(),
            self.out.clone(),
            self.config.clone(),
        )));
        Ok(())
    }

    fn stop(&self) {
        if let Some(task) = self.pump.lock().expect("pump slot poisoned").take() {
            // The pump is a pure filter, safe to drop at any await.
            task.abort();
        }
        self.inner.stop();
    }

    fn updates(&self) -> watch::Receiver<Option<GpsLocation>> {
        self.out.subscribe()
    }

    fn is_producing(&self) -> bool {
        self.inner.is_producing()
    }
}

impl std::fmt::Debug for ThrottledLocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledLocationSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn run_pump(
    mut raw: watch::Receiver<Option<GpsLocation>>,
    out: watch::Sender<Option<GpsLocation>>,
    config: LocationSourceConfig,
) {
    let mut last: Option<(Instant, GpsLocation)> = None;
    loop {
        if raw.changed().await.is_err() {
            break;
        }
        let Some(fix) = raw.borrow_and_update().clone() else {
            continue;
        };
        let now = Instant::now();
        let pass = match &last {
            None => true,
            Some((at, previous)) => {
                now.duration_since(*at) >= config.interval
                    && fix.distance_m(previous) >= config.min_displacement_m
            }
        };
        if pass {
            last = Some((now, fix.clone()));
            out.send_replace(Some(fix));
        } else {
            trace!("throttled a fix");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct RawSource {
        updates: watch::Sender<Option<GpsLocation>>,
        producing: AtomicBool,
        starts: AtomicUsize,
    }

    impl RawSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                updates: watch::channel(None).0,
                producing: AtomicBool::new(false),
                starts: AtomicUsize::new(0),
            })
        }

        fn emit(&self, fix: GpsLocation) {
            self.updates.send_replace(Some(fix));
        }
    }

    impl LocationSource for RawSource {
        fn start(&self) -> LocationResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.producing.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) {
            self.producing.store(false, Ordering::SeqCst);
        }

        fn updates(&self) -> watch::Receiver<Option<GpsLocation>> {
            self.updates.subscribe()
        }

        fn is_producing(&self) -> bool {
            self.producing.load(Ordering::SeqCst)
        }
    }

    fn fix(latitude: f64) -> GpsLocation {
        GpsLocation {
            latitude,
            longitude: 0.0,
            altitude: 0.0,
            horizontal_accuracy: None,
            timestamp: chrono::DateTime::UNIX_EPOCH,
        }
    }

    async fn next_forwarded(
        rx: &mut watch::Receiver<Option<GpsLocation>>,
    ) -> Option<GpsLocation> {
        tokio::time::timeout(Duration::from_millis(50), rx.changed())
            .await
            .ok()?
            .ok()?;
        rx.borrow_and_update().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn first_fix_passes_then_cadence_applies() {
        let raw = RawSource::new();
        let source = ThrottledLocationSource::new(
            raw.clone(),
            LocationSourceConfig {
                interval: Duration::from_secs(60),
                min_displacement_m: 0.0,
            },
        );
        source.start().unwrap();
        let mut rx = source.updates();

        raw.emit(fix(1.0));
        assert_eq!(next_forwarded(&mut rx).await.unwrap().latitude, 1.0);

        // Too soon: dropped.
        raw.emit(fix(2.0));
        assert!(next_forwarded(&mut rx).await.is_none());

        tokio::time::sleep(Duration::from_secs(61)).await;
        raw.emit(fix(3.0));
        assert_eq!(next_forwarded(&mut rx).await.unwrap().latitude, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn displacement_filter_suppresses_small_moves() {
        let raw = RawSource::new();
        let source = ThrottledLocationSource::new(
            raw.clone(),
            LocationSourceConfig {
                interval: Duration::ZERO,
                min_displacement_m: 500.0,
            },
        );
        source.start().unwrap();
        let mut rx = source.updates();

        raw.emit(fix(10.0));
        assert!(next_forwarded(&mut rx).await.is_some());

        // ~111 m north: under the 500 m floor.
        raw.emit(fix(10.001));
        assert!(next_forwarded(&mut rx).await.is_none());

        // ~1.1 km north of the last forwarded fix.
        raw.emit(fix(10.01));
        assert_eq!(next_forwarded(&mut rx).await.unwrap().latitude, 10.01);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_stop_reaches_the_raw_source() {
        let raw = RawSource::new();
        let source =
            ThrottledLocationSource::new(raw.clone(), LocationSourceConfig::default());

        source.start().unwrap();
        source.start().unwrap();
        assert_eq!(raw.starts.load(Ordering::SeqCst), 1);
        assert!(source.is_producing());

        source.stop();
        assert!(!source.is_producing());

        // Restartable after a stop.
        source.start().unwrap();
        assert_eq!(raw.starts.load(Ordering::SeqCst), 2);
    }
}
