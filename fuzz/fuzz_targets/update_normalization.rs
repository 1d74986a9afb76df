#![no_main]

//! Fuzz target for Telegram update normalization.
//!
//! Feeds arbitrary bytes through the same path the webhook handler uses:
//! JSON parsing followed by `normalize`. Neither step may panic, and any
//! event produced must serialize back into a sink payload.

use grouprelay_core::{normalize, SinkPayload};
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(update) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    let Some(event) = normalize(&update) else {
        return;
    };

    if let Some(key) = &event.group_key {
        assert!(!key.as_str().is_empty(), "group keys are never empty");
    }

    let payload = SinkPayload::single(event);
    let encoded = serde_json::to_vec(&payload).expect("payload always serializes");
    assert!(!encoded.is_empty());
});
