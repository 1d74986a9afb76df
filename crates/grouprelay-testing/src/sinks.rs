//! In-memory sinks for engine tests.
//!
//! Deliveries are timestamped with `tokio::time::Instant`, so tests running
//! on a paused runtime can assert exact virtual flush times.

use std::{sync::Arc, time::Duration};

use grouprelay_core::SinkPayload;
use grouprelay_delivery::{DeliveryError, Sink, SinkResponse};
use tokio::{
    sync::{Notify, RwLock},
    time::Instant,
};

/// One payload received by a [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Payload as handed to the sink.
    pub payload: SinkPayload,
    /// Tokio instant at which `deliver` was called.
    pub at: Instant,
}

impl Delivery {
    /// Media references of the delivered fragments, in order.
    pub fn media_refs(&self) -> Vec<String> {
        self.payload.fragments().iter().map(|f| f.media_ref.clone()).collect()
    }
}

/// Sink that records every payload and answers 200.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    deliveries: Arc<RwLock<Vec<Delivery>>>,
    notify: Arc<Notify>,
    delay: Duration,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays each delivery by `delay` before recording it completed.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns every delivery so far.
    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.read().await.clone()
    }

    /// Returns delivered group payloads only.
    pub async fn group_deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .read()
            .await
            .iter()
            .filter(|d| d.payload.group_key().is_some())
            .cloned()
            .collect()
    }

    /// Number of deliveries so far.
    pub async fn count(&self) -> usize {
        self.deliveries.read().await.len()
    }

    /// Waits until at least `expected` deliveries were recorded.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` elapses first.
    pub async fn wait_for(&self, expected: usize, timeout: Duration) -> Vec<Delivery> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let deliveries = self.deliveries().await;
                if deliveries.len() >= expected {
                    return deliveries;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(deliveries) => deliveries,
            Err(_) => panic!(
                "expected {expected} deliveries within {timeout:?}, got {}",
                self.count().await
            ),
        }
    }
}

#[async_trait::async_trait]
impl Sink for RecordingSink {
    async fn deliver(&self, payload: &SinkPayload) -> grouprelay_delivery::Result<SinkResponse> {
        let at = Instant::now();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.deliveries.write().await.push(Delivery { payload: payload.clone(), at });
        self.notify.notify_waiters();

        Ok(SinkResponse { status_code: 200, body: String::new(), duration: self.delay })
    }
}

/// Sink that rejects every payload with the given HTTP status.
#[derive(Debug, Clone, Default)]
pub struct FailingSink {
    status_code: u16,
    attempts: Arc<RwLock<Vec<SinkPayload>>>,
}

impl FailingSink {
    /// Creates a sink answering `status_code` to every delivery.
    pub fn new(status_code: u16) -> Self {
        Self { status_code, attempts: Arc::default() }
    }

    /// Payloads the sink was asked to deliver.
    pub async fn attempts(&self) -> Vec<SinkPayload> {
        self.attempts.read().await.clone()
    }
}

#[async_trait::async_trait]
impl Sink for FailingSink {
    async fn deliver(&self, payload: &SinkPayload) -> grouprelay_delivery::Result<SinkResponse> {
        self.attempts.write().await.push(payload.clone());
        Err(DeliveryError::from_status(self.status_code, "rejected by test sink"))
    }
}
