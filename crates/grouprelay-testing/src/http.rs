//! HTTP sink mock for end-to-end tests.

use std::time::Duration;

use http::StatusCode;
use serde_json::Value;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Path the mock sink listens on.
pub const SINK_PATH: &str = "/webhook/grouprelay";

/// Wiremock server standing in for the downstream automation webhook.
pub struct MockSink {
    server: MockServer,
}

impl MockSink {
    /// Starts a mock sink that accepts every payload with 200.
    pub async fn start() -> Self {
        Self::start_with_status(StatusCode::OK).await
    }

    /// Starts a mock sink answering every payload with `status`.
    pub async fn start_with_status(status: StatusCode) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SINK_PATH))
            .respond_with(ResponseTemplate::new(status.as_u16()))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Full URL to configure as the sink URL.
    pub fn url(&self) -> String {
        format!("{}{SINK_PATH}", self.server.uri())
    }

    /// JSON bodies of every request received so far.
    pub async fn received_payloads(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }

    /// Polls until `expected` payloads arrived or `timeout` elapses.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `expected` payloads arrive in time.
    pub async fn wait_for_payloads(&self, expected: usize, timeout: Duration) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let payloads = self.received_payloads().await;
            if payloads.len() >= expected {
                return payloads;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {expected} sink payloads within {timeout:?}, got {}",
                payloads.len()
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Asserts that exactly `expected` payloads were received.
    pub async fn assert_payload_count(&self, expected: usize) {
        let payloads = self.received_payloads().await;
        assert_eq!(
            payloads.len(),
            expected,
            "Expected {} payloads, received {}",
            expected,
            payloads.len()
        );
    }
}
