//! PollingScheduler: periodic status fetch for every known location
//!
//! One recurring timer task. Each tick spawns a full cycle; a cycle fetches
//! all locations concurrently and emits one telemetry frame per module, in
//! the order the vendor lists them within a location.
//!
//! Full cycles are serialized by `cycle`: an overlapping tick is skipped,
//! while `pause` and single-location refreshes wait their turn.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use crate::engine::registry::DeviceRegistry;
use crate::engine::session::ApiSession;
use crate::engine::telemetry;
use crate::engine::EventSink;
use crate::error::BridgeError;
use crate::models::{DiagnosticFrame, EngineEvent};

pub struct PollingScheduler {
    session: Arc<ApiSession>,
    registry: Arc<DeviceRegistry>,
    events: EventSink,
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Held for the duration of a cycle
    cycle: Mutex<()>,
}

impl PollingScheduler {
    pub fn new(session: Arc<ApiSession>, registry: Arc<DeviceRegistry>, events: EventSink) -> Self {
        Self {
            session,
            registry,
            events,
            timer: Mutex::new(None),
            cycle: Mutex::new(()),
        }
    }

    /// Start the recurring timer. Returns false when it was already running.
    pub async fn start(self: &Arc<Self>, interval: Duration) -> bool {
        let mut timer = self.timer.lock().await;
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("[Poller] Already running");
            return false;
        }

        tracing::info!("[Poller] Starting status polling (interval: {}s)", interval.as_secs());
        let scheduler = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let cycle = Arc::clone(&scheduler);
                // Detached so that stop() never cuts a cycle in half
                tokio::spawn(async move {
                    cycle.poll_cycle().await;
                });
            }
        }));
        true
    }

    /// Cancel future ticks. Returns false when nothing was running.
    pub async fn stop(&self) -> bool {
        match self.timer.lock().await.take() {
            Some(handle) => {
                handle.abort();
                tracing::info!("[Poller] Stopped");
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub async fn is_running(&self) -> bool {
        self.timer
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// One pass over all known locations. Returns false when skipped because
    /// another pass is still running.
    pub async fn poll_cycle(&self) -> bool {
        let Ok(_cycle) = self.cycle.try_lock() else {
            tracing::debug!("[Poller] Previous cycle still in progress, skipping");
            return false;
        };

        let locations = self.registry.locations().await;
        tracing::debug!("[Poller] Polling {} locations", locations.len());

        let results = join_all(locations.iter().map(|l| self.poll_location(&l.id))).await;
        for (location, result) in locations.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!("[Poller] Location {} status failed: {}", location.name, e);
            }
        }
        true
    }

    /// Out-of-cycle refresh of a single location. Waits for a running cycle
    /// instead of being skipped.
    pub async fn refresh_location(&self, location_id: &str) -> Result<usize, BridgeError> {
        let _cycle = self.cycle.lock().await;
        tracing::debug!("[Poller] Refreshing location {}", location_id);
        self.poll_location(location_id).await
    }

    /// Wait for the running cycle to finish and keep new ones from starting
    /// until the guard is dropped. Used while the registry is rebuilt.
    pub async fn pause(&self) -> MutexGuard<'_, ()> {
        self.cycle.lock().await
    }

    async fn poll_location(&self, location_id: &str) -> Result<usize, BridgeError> {
        let statuses = self
            .session
            .home_status(location_id)
            .await?
            .body
            .home
            .and_then(|h| h.modules)
            .unwrap_or_default();

        let mut emitted = 0;
        for status in &statuses {
            if self.registry.lookup(&status.id).await.is_none() {
                tracing::warn!("[Poller] Module {} is unknown, please make refresh", status.id);
                self.events.emit(EngineEvent::Diagnostic(DiagnosticFrame::info(format!(
                    "{} is unknown, please make refresh",
                    status.id
                ))));
                continue;
            }
            self.events.emit(EngineEvent::Telemetry(telemetry::normalize(status)));
            emitted += 1;
        }
        Ok(emitted)
    }
}
