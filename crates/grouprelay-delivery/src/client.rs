//! Sink adapter: delivers payloads to the downstream HTTP endpoint.
//!
//! A delivery is a single JSON `POST`. Non-2xx responses and transport
//! failures come back as categorized [`DeliveryError`]s; the client never
//! retries, because a retried batch could cross with a duplicate flush.

use std::time::{Duration, Instant};

use bytes::Bytes;
use grouprelay_core::SinkPayload;
use reqwest::{Response, Url};
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Header naming the payload kind (`single` or `group`).
pub const PAYLOAD_KIND_HEADER: &str = "X-Grouprelay-Payload-Kind";

/// Header carrying the group key of group payloads.
pub const GROUP_KEY_HEADER: &str = "X-Grouprelay-Group-Key";

/// Maximum response body retained for logging.
const MAX_LOGGED_BODY: usize = 1024;

/// Destination for forwarded payloads.
///
/// Implementations must be cheap to call concurrently; the engine invokes
/// `deliver` from many tasks at once.
#[async_trait::async_trait]
pub trait Sink: Send + Sync + std::fmt::Debug {
    /// Delivers one payload. Called at most once per payload.
    async fn deliver(&self, payload: &SinkPayload) -> Result<SinkResponse>;
}

/// Configuration for the HTTP sink client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for a single delivery request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: format!("grouprelay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone)]
pub struct SinkResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated for logging.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
}

/// Sink that posts JSON payloads to a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: Url,
    config: ClientConfig,
}

impl HttpSink {
    /// Creates a sink posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the URL is not an
    /// absolute http(s) URL or the HTTP client cannot be built.
    pub fn new(url: &str, config: ClientConfig) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| DeliveryError::configuration(format!("invalid sink URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DeliveryError::configuration(format!(
                "sink URL must use http or https, got {}",
                url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, url, config })
    }

    /// Creates a sink with default client configuration.
    pub fn with_defaults(url: &str) -> Result<Self> {
        Self::new(url, ClientConfig::default())
    }

    /// Returns the destination URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn read_body(response: Response) -> String {
        match response.bytes().await {
            Ok(bytes) if bytes.len() > MAX_LOGGED_BODY => {
                let truncated = String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY]);
                format!("{truncated}... (truncated)")
            },
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!("Failed to read sink response body: {}", e);
                String::new()
            },
        }
    }
}

#[async_trait::async_trait]
impl Sink for HttpSink {
    async fn deliver(&self, payload: &SinkPayload) -> Result<SinkResponse> {
        let start_time = Instant::now();
        let kind = if payload.group_key().is_some() { "group" } else { "single" };

        let span = info_span!(
            "sink_delivery",
            kind,
            group_key = payload.group_key().map(|k| k.as_str()).unwrap_or_default(),
            fragments = payload.fragments().len(),
        );

        async move {
            let body = serde_json::to_vec(payload)
                .map(Bytes::from)
                .map_err(|e| DeliveryError::serialization(e.to_string()))?;

            let mut request = self
                .client
                .post(self.url.clone())
                .header("content-type", "application/json")
                .header(PAYLOAD_KIND_HEADER, kind)
                .body(body);

            if let Some(key) = payload.group_key() {
                request = request.header(GROUP_KEY_HEADER, key.as_str());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(
                        duration_ms = start_time.elapsed().as_millis(),
                        "Sink request failed: {}",
                        e
                    );
                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let status = response.status();
            let body = Self::read_body(response).await;
            let duration = start_time.elapsed();

            if !status.is_success() {
                tracing::warn!(
                    status = status.as_u16(),
                    duration_ms = duration.as_millis(),
                    "Sink rejected payload"
                );
                return Err(DeliveryError::from_status(status.as_u16(), body));
            }

            tracing::debug!(
                status = status.as_u16(),
                duration_ms = duration.as_millis(),
                "Payload delivered to sink"
            );

            Ok(SinkResponse { status_code: status.as_u16(), body, duration })
        }
        .instrument(span)
        .await
    }
}

/// Sink used when no destination URL is configured.
///
/// Every delivery fails with a configuration error, so the loss is logged
/// instead of silently discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredSink;

#[async_trait::async_trait]
impl Sink for UnconfiguredSink {
    async fn deliver(&self, _payload: &SinkPayload) -> Result<SinkResponse> {
        Err(DeliveryError::configuration("sink URL is not configured"))
    }
}
