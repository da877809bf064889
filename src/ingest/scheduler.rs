//! Background refresh scheduling.
//!
//! The platform work scheduler (persistence across process restarts,
//! exact battery readings) is an external collaborator; this module is the
//! in-process analog: a periodic tick that runs Incremental ingests and a
//! one-shot trigger, both with replace-not-stack semantics.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::{IngestMode, IngestionCoordinator};

/// Default cadence of the periodic background refresh
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Battery constraint probe.
///
/// Scheduled refreshes only run while the battery is not low; the real
/// reading comes from the platform. [`AlwaysReady`] stands in where no
/// probe exists (desktop, tests).
pub trait BatteryProbe: Send + Sync {
    fn battery_not_low(&self) -> bool;
}

/// Probe that never reports a low battery
pub struct AlwaysReady;

impl BatteryProbe for AlwaysReady {
    fn battery_not_low(&self) -> bool {
        true
    }
}

/// Drives the coordinator from timed and one-shot triggers.
///
/// Re-scheduling the periodic task replaces the previous registration
/// (never stacks), and a superseded one-shot is replaced, not queued --
/// the coordinator's latest-wins rule then settles any overlap in flight.
pub struct IngestScheduler {
    coordinator: Arc<IngestionCoordinator>,
    battery: Arc<dyn BatteryProbe>,
    periodic: Mutex<Option<JoinHandle<()>>>,
    oneshot: Mutex<Option<JoinHandle<()>>>,
}

impl IngestScheduler {
    pub fn new(coordinator: Arc<IngestionCoordinator>) -> Self {
        Self::with_battery_probe(coordinator, Arc::new(AlwaysReady))
    }

    pub fn with_battery_probe(
        coordinator: Arc<IngestionCoordinator>,
        battery: Arc<dyn BatteryProbe>,
    ) -> Self {
        Self {
            coordinator,
            battery,
            periodic: Mutex::new(None),
            oneshot: Mutex::new(None),
        }
    }

    /// Register the periodic Incremental refresh for `url`.
    ///
    /// Any previously registered periodic task is cancelled first; the new
    /// task's first run happens one full interval from now. Ticks are
    /// skipped while the battery probe reports low.
    pub async fn schedule_periodic(&self, url: String, interval: Duration) {
        let coordinator = Arc::clone(&self.coordinator);
        let battery = Arc::clone(&self.battery);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; the caller already did its
            // startup ingest, so consume the first tick
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !battery.battery_not_low() {
                    tracing::debug!("skipping scheduled refresh: battery low");
                    continue;
                }
                coordinator.ingest(&url, IngestMode::Incremental).await;
            }
        });

        if let Some(previous) = self.periodic.lock().await.replace(handle) {
            tracing::debug!("replacing existing periodic refresh registration");
            previous.abort();
        }
    }

    /// Fire a one-shot ingestion, replacing any pending one-shot.
    pub async fn trigger_once(&self, url: String, mode: IngestMode) {
        let coordinator = Arc::clone(&self.coordinator);
        let handle = tokio::spawn(async move {
            coordinator.ingest(&url, mode).await;
        });

        if let Some(previous) = self.oneshot.lock().await.replace(handle) {
            previous.abort();
        }
    }

    /// Cancel everything this scheduler has registered.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.periodic.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.oneshot.lock().await.take() {
            handle.abort();
        }
    }
}
