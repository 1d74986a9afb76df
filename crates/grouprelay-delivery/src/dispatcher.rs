//! Flush dispatcher: drains completed groups and hands them to the sink.
//!
//! Draining happens before delivery. Once a group has been drained its data
//! exists only in the payload being delivered; a sink failure is reported to
//! the caller and the batch is dropped rather than re-enqueued.

use std::sync::Arc;

use grouprelay_core::{Clock, GroupKey, GroupStore, InboundEvent, SinkPayload};
use tracing::{debug, info, warn};

use crate::{
    client::{Sink, SinkResponse},
    engine::EngineStats,
    error::{ErrorCategory, Result},
};

/// Result of a dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Group was drained and delivered.
    Delivered {
        /// Number of fragments in the batch.
        fragments: usize,
        /// HTTP status returned by the sink.
        status_code: u16,
    },
    /// Nothing to deliver: another flush already drained the group.
    Empty,
}

/// Drains groups from the store and delivers them to the sink.
#[derive(Debug, Clone)]
pub struct FlushDispatcher {
    store: Arc<dyn GroupStore>,
    sink: Arc<dyn Sink>,
    clock: Arc<dyn Clock>,
    stats: Arc<EngineStats>,
}

impl FlushDispatcher {
    /// Creates a dispatcher over the given store and sink.
    pub fn new(
        store: Arc<dyn GroupStore>,
        sink: Arc<dyn Sink>,
        clock: Arc<dyn Clock>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self { store, sink, clock, stats }
    }

    /// Drains `key` and delivers the batch once.
    ///
    /// # Errors
    ///
    /// Returns the store error if draining fails (the group stays buffered)
    /// or the sink error if delivery fails (the batch is lost).
    pub async fn dispatch(&self, key: &GroupKey) -> Result<DispatchOutcome> {
        let Some(record) = self.store.drain(key).await.inspect_err(|e| {
            self.stats.record_store_failure();
            warn!(group_key = %key, error = %e, "failed to drain media group");
        })?
        else {
            debug!(group_key = %key, "group already drained, skipping flush");
            self.stats.record_empty_drain();
            return Ok(DispatchOutcome::Empty);
        };

        let fragments = record.fragments.len();
        let waited_ms = self
            .clock
            .now_utc()
            .signed_duration_since(record.first_seen_at)
            .num_milliseconds();
        let payload = SinkPayload::group(record, self.clock.now_utc());

        match self.deliver(&payload).await {
            Ok(response) => {
                self.stats.record_group_flushed();
                info!(
                    group_key = %key,
                    fragments,
                    assembly_ms = waited_ms,
                    status = response.status_code,
                    "media group flushed"
                );
                Ok(DispatchOutcome::Delivered { fragments, status_code: response.status_code })
            },
            Err(e) => {
                warn!(
                    group_key = %key,
                    fragments,
                    category = %ErrorCategory::from(&e),
                    error = %e,
                    "media group delivery failed, batch dropped"
                );
                Err(e)
            },
        }
    }

    /// Forwards an ungrouped event straight to the sink.
    ///
    /// # Errors
    ///
    /// Returns the sink error if delivery fails.
    pub async fn forward_single(&self, event: InboundEvent) -> Result<SinkResponse> {
        let sequence_id = event.fragment.sequence_id;
        let payload = SinkPayload::single(event);

        let response = self.deliver(&payload).await.inspect_err(|e| {
            warn!(
                sequence_id,
                category = %ErrorCategory::from(e),
                error = %e,
                "single event delivery failed"
            );
        })?;

        self.stats.record_single_forwarded();
        debug!(sequence_id, status = response.status_code, "single event forwarded");
        Ok(response)
    }

    async fn deliver(&self, payload: &SinkPayload) -> Result<SinkResponse> {
        self.sink.deliver(payload).await.inspect_err(|_| self.stats.record_delivery_failure())
    }
}
