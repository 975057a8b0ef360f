// Poll Scheduler
//
// Periodically lists the first page and forwards records that are newer
// than the store's last full load and not already held. Ticks never
// overlap; a tick that would overlap is skipped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::duration_millis;
use crate::store::NotificationStore;
use crate::traits::Subscription;

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollerConfig {
    /// Time between ticks; zero disables polling
    #[serde(with = "duration_millis")]
    pub interval: Duration,

    /// Records requested per tick
    pub window: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            window: 50,
        }
    }
}

impl PollerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_window(mut self, window: u32) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Previous tick still running, store loading, or no baseline yet
    Skipped,
    /// Number of records forwarded to the store
    Delivered(usize),
    /// The list call failed; retried on the next tick
    Failed,
}

pub struct PollScheduler {
    store: NotificationStore,
    config: PollerConfig,
    in_flight: AtomicBool,
}

impl PollScheduler {
    pub fn new(store: NotificationStore, config: PollerConfig) -> Self {
        Self {
            store,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Run one poll cycle
    #[instrument(skip(self), fields(window = self.config.window))]
    pub async fn tick(&self) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("Previous tick still in flight");
            return TickOutcome::Skipped;
        }

        let outcome = self.poll_once().await;
        self.in_flight.store(false, Ordering::Release);
        outcome
    }

    async fn poll_once(&self) -> TickOutcome {
        if self.store.is_loading() {
            trace!("Store is loading, skipping tick");
            return TickOutcome::Skipped;
        }
        let Some(cutoff) = self.store.last_check_time() else {
            trace!("No baseline load yet, skipping tick");
            return TickOutcome::Skipped;
        };

        match self
            .store
            .api()
            .list(self.store.config().feed_query(1, self.config.window))
            .await
        {
            Ok(page) => {
                let delivered = self.store.deliver_novel(page.items, cutoff);
                if delivered > 0 {
                    debug!(delivered, "Poll delivered new notifications");
                }
                TickOutcome::Delivered(delivered)
            }
            Err(e) => {
                warn!(error = %e, "Poll failed, will retry next interval");
                TickOutcome::Failed
            }
        }
    }

    /// Spawn the interval loop. Returns `None` when polling is disabled.
    pub fn start(self) -> Option<PollHandle> {
        if !self.config.is_enabled() {
            info!("Polling disabled");
            return None;
        }

        let interval = self.config.interval;
        let scheduler = Arc::new(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn({
            let scheduler = scheduler.clone();
            async move {
                let mut ticker = tokio::time::interval_at(
                    tokio::time::Instant::now() + interval,
                    interval,
                );
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            scheduler.tick().await;
                        }
                        _ = shutdown_rx.changed() => {
                            debug!("Poll scheduler shutdown signal received");
                            break;
                        }
                    }
                }
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "Poll scheduler started");
        Some(PollHandle {
            shutdown_tx,
            task: Some(task),
        })
    }
}

/// Owns a running poll loop; stops it on `stop()` or drop
pub struct PollHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Subscription for PollHandle {
    fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn name(&self) -> &str {
        "poller"
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
