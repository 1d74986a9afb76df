//! Telegram update builders.
//!
//! Builds Bot API update bodies shaped like the ones Telegram posts to a
//! webhook. Defaults describe a private chat message from a fixed user.

use bytes::Bytes;
use serde_json::{json, Map, Value};

/// Default user id used as `from.id`.
pub const DEFAULT_USER_ID: i64 = 424_242;

/// Default chat id used as `chat.id`.
pub const DEFAULT_CHAT_ID: i64 = -100_123;

#[derive(Debug, Clone)]
enum Media {
    Photo(String),
    Document(String),
    Video(String),
    Text(String),
}

/// Builder for Telegram updates carrying a single message.
///
/// # Example
///
/// ```
/// use grouprelay_testing::MessageBuilder;
///
/// let update = MessageBuilder::photo(10, "file-a").media_group("G1").caption("first").build();
/// assert_eq!(update["message"]["media_group_id"], "G1");
/// ```
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    update_id: i64,
    message_id: i64,
    media: Media,
    media_group_id: Option<Value>,
    caption: Option<String>,
    from: Option<Value>,
    chat: Value,
    channel_post: bool,
}

impl MessageBuilder {
    fn new(message_id: i64, media: Media) -> Self {
        Self {
            update_id: 1_000 + message_id,
            message_id,
            media,
            media_group_id: None,
            caption: None,
            from: Some(json!({"id": DEFAULT_USER_ID, "is_bot": false, "first_name": "Test"})),
            chat: json!({"id": DEFAULT_CHAT_ID, "type": "supergroup", "title": "Test chat"}),
            channel_post: false,
        }
    }

    /// Photo message. The highest resolution variant has id `file_id`; a
    /// thumbnail variant `{file_id}-thumb` is listed first.
    pub fn photo(message_id: i64, file_id: impl Into<String>) -> Self {
        Self::new(message_id, Media::Photo(file_id.into()))
    }

    /// Document message.
    pub fn document(message_id: i64, file_id: impl Into<String>) -> Self {
        Self::new(message_id, Media::Document(file_id.into()))
    }

    /// Video message.
    pub fn video(message_id: i64, file_id: impl Into<String>) -> Self {
        Self::new(message_id, Media::Video(file_id.into()))
    }

    /// Plain text message with no media.
    pub fn text(message_id: i64, text: impl Into<String>) -> Self {
        Self::new(message_id, Media::Text(text.into()))
    }

    /// Marks the message as part of a media group with a string id.
    #[must_use]
    pub fn media_group(mut self, id: impl Into<String>) -> Self {
        self.media_group_id = Some(Value::String(id.into()));
        self
    }

    /// Sets a raw `media_group_id` value, for malformed or numeric ids.
    #[must_use]
    pub fn media_group_value(mut self, id: Value) -> Self {
        self.media_group_id = Some(id);
        self
    }

    /// Sets the caption.
    #[must_use]
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Sets the sending user.
    #[must_use]
    pub fn from_user(mut self, id: i64, first_name: &str) -> Self {
        self.from = Some(json!({"id": id, "is_bot": false, "first_name": first_name}));
        self
    }

    /// Sets the chat id.
    #[must_use]
    pub fn chat(mut self, id: i64) -> Self {
        self.chat["id"] = json!(id);
        self
    }

    /// Delivers the message as a `channel_post` signed by the channel.
    #[must_use]
    pub fn channel_post(mut self) -> Self {
        self.channel_post = true;
        self.from = None;
        self.chat = json!({"id": DEFAULT_CHAT_ID, "type": "channel", "title": "Test channel"});
        self
    }

    /// Builds the message object alone.
    pub fn message(&self) -> Value {
        let mut message = Map::new();
        message.insert("message_id".to_string(), json!(self.message_id));
        message.insert("date".to_string(), json!(1_700_000_000 + self.message_id));
        message.insert("chat".to_string(), self.chat.clone());

        if let Some(from) = &self.from {
            message.insert("from".to_string(), from.clone());
        }
        if self.channel_post {
            message.insert("sender_chat".to_string(), self.chat.clone());
        }
        if let Some(id) = &self.media_group_id {
            message.insert("media_group_id".to_string(), id.clone());
        }
        if let Some(caption) = &self.caption {
            message.insert("caption".to_string(), json!(caption));
        }

        match &self.media {
            Media::Photo(file_id) => {
                message.insert(
                    "photo".to_string(),
                    json!([
                        {"file_id": format!("{file_id}-thumb"), "width": 90, "height": 60},
                        {"file_id": file_id, "width": 1280, "height": 853},
                    ]),
                );
            },
            Media::Document(file_id) => {
                message.insert(
                    "document".to_string(),
                    json!({"file_id": file_id, "file_name": "file.pdf"}),
                );
            },
            Media::Video(file_id) => {
                message.insert(
                    "video".to_string(),
                    json!({"file_id": file_id, "duration": 3, "width": 640, "height": 480}),
                );
            },
            Media::Text(text) => {
                message.insert("text".to_string(), json!(text));
            },
        }

        Value::Object(message)
    }

    /// Builds the full update.
    pub fn build(&self) -> Value {
        let field = if self.channel_post { "channel_post" } else { "message" };
        let mut update = Map::new();
        update.insert("update_id".to_string(), json!(self.update_id));
        update.insert(field.to_string(), self.message());
        Value::Object(update)
    }

    /// Builds the update serialized as a request body.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.build().to_string())
    }
}

/// Builds one photo update per file id, all in media group `group`.
///
/// Message ids start at `first_message_id`; only the first item carries
/// `caption`, mirroring how Telegram sends album captions.
pub fn album(group: &str, first_message_id: i64, file_ids: &[&str], caption: &str) -> Vec<Value> {
    file_ids
        .iter()
        .zip(first_message_id..)
        .map(|(file_id, message_id)| {
            let builder = MessageBuilder::photo(message_id, *file_id).media_group(group);
            if message_id == first_message_id {
                builder.caption(caption).build()
            } else {
                builder.build()
            }
        })
        .collect()
}
