//! Telegram update normalization.
//!
//! Turns a raw Bot API update into an [`InboundEvent`]. Pure function, no
//! I/O. Anything that is not a content message (callback queries, member
//! updates, polls, malformed JSON shapes) yields `None` and is acknowledged
//! without further processing.

use serde_json::Value;

use crate::models::{Fragment, GroupKey, InboundEvent, SenderInfo};

/// Update fields that carry a content message, in lookup order.
const CONTENT_FIELDS: [&str; 2] = ["message", "channel_post"];

/// Normalizes a raw update into an inbound event.
///
/// Returns `None` when the update carries no content message.
///
/// # Example
///
/// ```
/// use grouprelay_core::normalize;
/// use serde_json::json;
///
/// let update = json!({
///     "update_id": 1,
///     "message": {
///         "message_id": 10,
///         "media_group_id": "G1",
///         "photo": [{"file_id": "small", "width": 90, "height": 90},
///                   {"file_id": "large", "width": 1280, "height": 1280}],
///         "caption": "first"
///     }
/// });
///
/// let event = normalize(&update).unwrap();
/// assert_eq!(event.group_key.unwrap().as_str(), "G1");
/// assert_eq!(event.fragment.media_ref, "large");
/// ```
pub fn normalize(update: &Value) -> Option<InboundEvent> {
    let (field, message) = CONTENT_FIELDS
        .iter()
        .find_map(|field| update.get(*field).filter(|m| m.is_object()).map(|m| (*field, m)))?;

    let fragment = Fragment {
        media_ref: extract_media_ref(message).unwrap_or_default(),
        caption: message.get("caption").and_then(Value::as_str).unwrap_or_default().to_string(),
        sequence_id: message.get("message_id").and_then(Value::as_i64).unwrap_or_default(),
    };

    Some(InboundEvent {
        group_key: extract_group_key(message),
        fragment,
        sender_info: extract_sender_info(message, field == "channel_post"),
        raw: message.clone(),
    })
}

/// Picks the file reference: largest photo variant, then document, then video.
fn extract_media_ref(message: &Value) -> Option<String> {
    largest_photo(message)
        .or_else(|| file_id(message.get("document")))
        .or_else(|| file_id(message.get("video")))
}

fn largest_photo(message: &Value) -> Option<String> {
    let variants = message.get("photo")?.as_array()?;

    // Telegram lists sizes ascending; `max_by_key` keeps the last of equal
    // areas, which matches that ordering when dimensions are missing.
    variants
        .iter()
        .filter(|variant| variant.get("file_id").and_then(Value::as_str).is_some())
        .max_by_key(|variant| {
            let width = variant.get("width").and_then(Value::as_u64).unwrap_or(0);
            let height = variant.get("height").and_then(Value::as_u64).unwrap_or(0);
            width.saturating_mul(height)
        })
        .and_then(|variant| file_id(Some(variant)))
}

fn file_id(value: Option<&Value>) -> Option<String> {
    value?.get("file_id")?.as_str().filter(|id| !id.is_empty()).map(str::to_string)
}

fn extract_group_key(message: &Value) -> Option<GroupKey> {
    match message.get("media_group_id")? {
        Value::String(key) if !key.is_empty() => Some(GroupKey::new(key.as_str())),
        Value::Number(key) => Some(GroupKey::new(key.to_string())),
        _ => None,
    }
}

fn extract_sender_info(message: &Value, is_channel_post: bool) -> SenderInfo {
    let mut info = SenderInfo::new();

    let sender = if is_channel_post {
        message.get("sender_chat").or_else(|| message.get("from"))
    } else {
        message.get("from")
    };

    if let Some(sender) = sender.filter(|s| s.is_object()) {
        info.insert("from".to_string(), sender.clone());
    }
    if let Some(chat) = message.get("chat").filter(|c| c.is_object()) {
        info.insert("chat".to_string(), chat.clone());
    }

    info
}
