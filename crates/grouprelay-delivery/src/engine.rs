//! Debounce engine for media group assembly.
//!
//! Every fragment of a group is appended to the store and refreshes the
//! group's quiescence marker. Each append also schedules its own deferred
//! check, which fires one window later; only the check that finds the marker
//! expired drains and delivers the group. Earlier checks become no-ops,
//! because a later arrival pushed the marker forward.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  append + mark  ┌──────────────┐
//! │ DebounceEngine │────────────────▶│  GroupStore  │
//! └────────────────┘                 └──────────────┘
//!        │ spawn check                      ▲ drain
//!        ▼                                  │
//! ┌────────────────┐   expired?      ┌──────────────┐   POST   ┌──────┐
//! │ Deferred check │────────────────▶│  Dispatcher  │─────────▶│ Sink │
//! └────────────────┘                 └──────────────┘          └──────┘
//! ```
//!
//! Checks are never cancelled. On shutdown the cancellation token wakes all
//! pending checks, which flush their groups immediately instead of waiting
//! out the rest of the window.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::future::join_all;
use grouprelay_core::{Clock, GroupKey, GroupStore, InboundEvent};
use serde::Serialize;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    client::Sink,
    dispatcher::{DispatchOutcome, FlushDispatcher},
    error::{DeliveryError, Result},
};

/// Timing configuration for the debounce engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Quiescence window a group must stay silent before it is flushed.
    pub debounce_window: Duration,

    /// How often the orphan sweeper scans for abandoned groups.
    /// `Duration::ZERO` disables the sweeper.
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(crate::DEFAULT_DEBOUNCE_WINDOW_MS),
            sweep_interval: Duration::from_secs(crate::DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

/// Lock-free counters describing engine activity since startup.
#[derive(Debug, Default)]
pub struct EngineStats {
    events_received: AtomicU64,
    singles_forwarded: AtomicU64,
    fragments_buffered: AtomicU64,
    checks_scheduled: AtomicU64,
    checks_superseded: AtomicU64,
    groups_flushed: AtomicU64,
    groups_recovered: AtomicU64,
    empty_drains: AtomicU64,
    delivery_failures: AtomicU64,
    store_failures: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Events accepted by `submit`.
    pub events_received: u64,
    /// Ungrouped events delivered to the sink.
    pub singles_forwarded: u64,
    /// Fragments appended to the store.
    pub fragments_buffered: u64,
    /// Deferred checks spawned.
    pub checks_scheduled: u64,
    /// Checks that found a live marker and did nothing.
    pub checks_superseded: u64,
    /// Groups drained and delivered.
    pub groups_flushed: u64,
    /// Groups flushed by the orphan sweeper.
    pub groups_recovered: u64,
    /// Drains that found nothing left to deliver.
    pub empty_drains: u64,
    /// Sink deliveries that failed.
    pub delivery_failures: u64,
    /// Store operations that failed.
    pub store_failures: u64,
}

impl EngineStats {
    /// Captures the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            singles_forwarded: self.singles_forwarded.load(Ordering::Relaxed),
            fragments_buffered: self.fragments_buffered.load(Ordering::Relaxed),
            checks_scheduled: self.checks_scheduled.load(Ordering::Relaxed),
            checks_superseded: self.checks_superseded.load(Ordering::Relaxed),
            groups_flushed: self.groups_flushed.load(Ordering::Relaxed),
            groups_recovered: self.groups_recovered.load(Ordering::Relaxed),
            empty_drains: self.empty_drains.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_single_forwarded(&self) {
        self.singles_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fragment_buffered(&self) {
        self.fragments_buffered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_check_scheduled(&self) {
        self.checks_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_check_superseded(&self) {
        self.checks_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_group_flushed(&self) {
        self.groups_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_group_recovered(&self) {
        self.groups_recovered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_drain(&self) {
        self.empty_drains.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// What `submit` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Ungrouped event handed to a background forwarder.
    Forwarded,
    /// Fragment buffered; the group now holds `fragments` items.
    Buffered {
        /// Fragments buffered for the group so far.
        fragments: usize,
    },
}

/// What a deferred check did when it fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// A later fragment refreshed the marker; nothing to do.
    Superseded,
    /// Group drained and delivered.
    Flushed {
        /// Fragments in the delivered batch.
        fragments: usize,
    },
    /// Another check already drained the group.
    AlreadyDrained,
    /// Store or sink failure; already logged.
    Failed,
}

/// Debounce engine coordinating buffering, deferred checks and flushes.
///
/// Cloning is cheap and every clone drives the same engine.
#[derive(Debug, Clone)]
pub struct DebounceEngine {
    store: Arc<dyn GroupStore>,
    dispatcher: FlushDispatcher,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    stats: Arc<EngineStats>,
    tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl DebounceEngine {
    /// Creates an engine over `store` delivering to `sink`.
    pub fn new(
        store: Arc<dyn GroupStore>,
        sink: Arc<dyn Sink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let stats = Arc::new(EngineStats::default());
        let dispatcher = FlushDispatcher::new(store.clone(), sink, clock.clone(), stats.clone());

        Self {
            store,
            dispatcher,
            clock,
            config,
            stats,
            tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Starts background maintenance.
    ///
    /// Spawns the orphan sweeper unless `sweep_interval` is zero. Call once.
    pub fn start(&self) {
        if self.config.sweep_interval.is_zero() {
            info!(
                window_ms = self.config.debounce_window.as_millis(),
                "debounce engine started, orphan sweeper disabled"
            );
            return;
        }

        info!(
            window_ms = self.config.debounce_window.as_millis(),
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            "debounce engine started"
        );

        let engine = self.clone();
        self.tracker.spawn(async move { engine.run_sweeper().await });
    }

    /// Accepts one normalized event.
    ///
    /// Ungrouped events are forwarded on a background task. Grouped events are
    /// appended, their marker is refreshed and a deferred check is scheduled.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::StoreError` if the append or marker update
    /// fails, and `DeliveryError::ShutdownRequested` once shutdown began.
    pub async fn submit(&self, event: InboundEvent) -> Result<SubmitOutcome> {
        if self.cancellation_token.is_cancelled() {
            return Err(DeliveryError::ShutdownRequested);
        }
        self.stats.record_event_received();

        let Some(key) = event.group_key.clone() else {
            let dispatcher = self.dispatcher.clone();
            self.tracker.spawn(async move {
                // Failure is logged by the dispatcher.
                let _ = dispatcher.forward_single(event).await;
            });
            return Ok(SubmitOutcome::Forwarded);
        };

        let fragments = self
            .store
            .append(&key, event.fragment, &event.sender_info)
            .await
            .map_err(|e| self.store_failure(&key, "append", e.into()))?;

        self.store
            .mark_quiescence(&key, self.config.debounce_window)
            .await
            .map_err(|e| self.store_failure(&key, "mark_quiescence", e.into()))?;

        self.stats.record_fragment_buffered();
        self.stats.record_check_scheduled();
        debug!(group_key = %key, fragments, "fragment buffered, check scheduled");

        let engine = self.clone();
        self.tracker.spawn(async move { engine.deferred_check(key).await });

        Ok(SubmitOutcome::Buffered { fragments })
    }

    /// Runs the quiescence check for `key` now.
    ///
    /// Flushes the group if its marker has expired, otherwise does nothing.
    pub async fn check(&self, key: &GroupKey) -> CheckOutcome {
        match self.store.is_quiescence_expired(key).await {
            Ok(true) => self.flush(key).await,
            Ok(false) => {
                self.stats.record_check_superseded();
                debug!(group_key = %key, "check superseded by a later fragment");
                CheckOutcome::Superseded
            },
            Err(e) => {
                self.stats.record_store_failure();
                warn!(group_key = %key, error = %e, "quiescence check failed");
                CheckOutcome::Failed
            },
        }
    }

    /// Flushes every group idle for longer than the window.
    ///
    /// Returns the number of groups delivered.
    pub async fn sweep(&self) -> usize {
        let keys = match self.store.stale_keys(self.config.debounce_window).await {
            Ok(keys) => keys,
            Err(e) => {
                self.stats.record_store_failure();
                warn!(error = %e, "orphan sweep failed to list stale groups");
                return 0;
            },
        };

        if keys.is_empty() {
            return 0;
        }

        info!(count = keys.len(), "recovering orphaned media groups");

        let outcomes = join_all(keys.iter().map(|key| self.flush(key))).await;
        let recovered = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, CheckOutcome::Flushed { .. }))
            .count();

        for _ in 0..recovered {
            self.stats.record_group_recovered();
        }
        recovered
    }

    /// Stops accepting events and flushes pending groups.
    ///
    /// Pending checks wake immediately and flush their groups; this waits up
    /// to `timeout` for them and any in-flight forwards.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ShutdownTimeout` if tasks are still running
    /// when the timeout elapses.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        info!(in_flight = self.tracker.len(), "shutting down debounce engine");

        self.cancellation_token.cancel();
        self.tracker.close();

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("debounce engine shutdown completed");
                Ok(())
            },
            Err(_) => {
                let pending = self.tracker.len();
                warn!(
                    pending,
                    timeout_secs = timeout.as_secs(),
                    "debounce engine shutdown timed out"
                );
                Err(DeliveryError::ShutdownTimeout { pending })
            },
        }
    }

    /// Returns current engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the engine's timing configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the group store the engine buffers into.
    pub fn store(&self) -> &Arc<dyn GroupStore> {
        &self.store
    }

    /// Number of background tasks (checks, forwards, sweeper) still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// True once `shutdown` has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    async fn deferred_check(&self, key: GroupKey) -> CheckOutcome {
        let shutting_down = tokio::select! {
            () = self.clock.sleep(self.config.debounce_window) => false,
            () = self.cancellation_token.cancelled() => true,
        };

        if shutting_down {
            debug!(group_key = %key, "flushing group early for shutdown");
            return self.flush(&key).await;
        }
        self.check(&key).await
    }

    async fn flush(&self, key: &GroupKey) -> CheckOutcome {
        match self.dispatcher.dispatch(key).await {
            Ok(DispatchOutcome::Delivered { fragments, .. }) => CheckOutcome::Flushed { fragments },
            Ok(DispatchOutcome::Empty) => CheckOutcome::AlreadyDrained,
            Err(_) => CheckOutcome::Failed,
        }
    }

    async fn run_sweeper(&self) {
        debug!("orphan sweeper started");
        loop {
            tokio::select! {
                () = self.clock.sleep(self.config.sweep_interval) => {},
                () = self.cancellation_token.cancelled() => break,
            }
            self.sweep().await;
        }
        debug!("orphan sweeper stopped");
    }

    fn store_failure(
        &self,
        key: &GroupKey,
        operation: &str,
        error: DeliveryError,
    ) -> DeliveryError {
        self.stats.record_store_failure();
        warn!(group_key = %key, operation, error = %error, "group store operation failed");
        error
    }
}
