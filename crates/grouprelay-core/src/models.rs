//! Core domain models and outbound payload shapes.
//!
//! Defines the normalized inbound event, the per-group record held by the
//! store while a media group is being assembled, and the two JSON payloads
//! delivered to the sink. Wire names are camelCase to match what downstream
//! automation workflows consume.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sender metadata captured from the upstream update.
pub type SenderInfo = serde_json::Map<String, Value>;

/// Opaque identifier of a burst of related updates.
///
/// Supplied by the upstream platform (Telegram `media_group_id`) and never
/// generated locally.
///
/// # Example
///
/// ```
/// use grouprelay_core::GroupKey;
/// let key = GroupKey::new("13572468");
/// assert_eq!(key.as_str(), "13572468");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    /// Creates a group key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for GroupKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for GroupKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl AsRef<str> for GroupKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The content carried by one update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    /// Platform file reference, empty when the update carries no media.
    pub media_ref: String,
    /// Caption text, empty when absent.
    pub caption: String,
    /// Upstream message id.
    pub sequence_id: i64,
}

impl Fragment {
    /// Creates a fragment.
    pub fn new(media_ref: impl Into<String>, caption: impl Into<String>, sequence_id: i64) -> Self {
        Self { media_ref: media_ref.into(), caption: caption.into(), sequence_id }
    }
}

/// Normalized representation of a content update.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Group this update belongs to; `None` for standalone messages.
    pub group_key: Option<GroupKey>,
    /// Extracted content.
    pub fragment: Fragment,
    /// Sender metadata, possibly empty.
    pub sender_info: SenderInfo,
    /// The original message object.
    pub raw: Value,
}

impl InboundEvent {
    /// Returns true when the event bypasses grouping.
    pub fn is_single(&self) -> bool {
        self.group_key.is_none()
    }
}

/// A media group under assembly, as drained from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    /// Group identifier.
    pub key: GroupKey,
    /// Fragments in arrival order.
    pub fragments: Vec<Fragment>,
    /// Sender metadata captured from the first fragment.
    pub sender_info: SenderInfo,
    /// When the first fragment of this generation arrived.
    pub first_seen_at: DateTime<Utc>,
}

/// Payload forwarded for an update without a group key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinglePayload {
    /// Always `true`; lets downstream workflows branch on payload kind.
    pub single: bool,
    /// The update's content.
    pub fragment: Fragment,
    /// Sender metadata, omitted when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_info: Option<SenderInfo>,
    /// The original message object.
    pub raw: Value,
}

/// Payload forwarded for a completed media group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPayload {
    /// Group identifier.
    pub group_key: GroupKey,
    /// All fragments of the group in arrival order.
    pub fragments: Vec<Fragment>,
    /// Sender metadata, omitted when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_info: Option<SenderInfo>,
    /// When the group was flushed.
    pub dispatched_at: DateTime<Utc>,
}

/// Any payload the sink accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SinkPayload {
    /// A single standalone update.
    Single(SinglePayload),
    /// A consolidated media group.
    Group(GroupPayload),
}

impl SinkPayload {
    /// Builds the passthrough payload for an ungrouped event.
    pub fn single(event: InboundEvent) -> Self {
        Self::Single(SinglePayload {
            single: true,
            fragment: event.fragment,
            sender_info: non_empty(event.sender_info),
            raw: event.raw,
        })
    }

    /// Builds the batch payload for a drained group.
    pub fn group(record: GroupRecord, dispatched_at: DateTime<Utc>) -> Self {
        Self::Group(GroupPayload {
            group_key: record.key,
            fragments: record.fragments,
            sender_info: non_empty(record.sender_info),
            dispatched_at,
        })
    }

    /// Returns the group key for group payloads.
    pub fn group_key(&self) -> Option<&GroupKey> {
        match self {
            Self::Single(_) => None,
            Self::Group(group) => Some(&group.group_key),
        }
    }

    /// Returns the fragments carried by this payload.
    pub fn fragments(&self) -> &[Fragment] {
        match self {
            Self::Single(single) => std::slice::from_ref(&single.fragment),
            Self::Group(group) => &group.fragments,
        }
    }
}

fn non_empty(info: SenderInfo) -> Option<SenderInfo> {
    if info.is_empty() {
        None
    } else {
        Some(info)
    }
}
