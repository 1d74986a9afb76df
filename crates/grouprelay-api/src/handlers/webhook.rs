//! Telegram update ingestion.
//!
//! Telegram retries any update that is not acknowledged with a 2xx, so this
//! handler answers 200 for everything it receives: malformed bodies and
//! updates without content are acknowledged as `ignored`, and store or
//! shutdown failures are logged but still acknowledged as `accepted`.

use axum::{extract::State, http::StatusCode, Json};
use bytes::Bytes;
use grouprelay_core::normalize;
use grouprelay_delivery::{ErrorCategory, SubmitOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::AppState;

/// Acknowledgement body returned to Telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    /// What happened to the update.
    pub status: AckStatus,
}

/// Disposition of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    /// Normalized and handed to the engine.
    Accepted,
    /// Not a content update, or not parseable.
    Ignored,
}

/// Receives one Telegram update.
#[instrument(name = "receive_update", skip(state, body), fields(body_size = body.len()))]
pub async fn receive_update(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    let update: Value = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            debug!(error = %e, "ignoring update with malformed JSON body");
            return ack(AckStatus::Ignored);
        },
    };

    let Some(event) = normalize(&update) else {
        debug!("ignoring update without a content message");
        return ack(AckStatus::Ignored);
    };

    let sequence_id = event.fragment.sequence_id;
    match state.engine.submit(event).await {
        Ok(SubmitOutcome::Forwarded) => {
            debug!(sequence_id, "single update forwarded");
        },
        Ok(SubmitOutcome::Buffered { fragments }) => {
            debug!(sequence_id, fragments, "media group fragment buffered");
        },
        Err(e) => {
            warn!(
                sequence_id,
                category = %ErrorCategory::from(&e),
                error = %e,
                "update acknowledged but not queued"
            );
        },
    }

    ack(AckStatus::Accepted)
}

fn ack(status: AckStatus) -> (StatusCode, Json<WebhookAck>) {
    (StatusCode::OK, Json(WebhookAck { status }))
}
