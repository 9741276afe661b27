//! Chat message types and the JSON wire format.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SendRejected;

/// Longest accepted outgoing message, in characters after trimming.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Locally assigned message identifier, `{millis}-{counter}`.
///
/// Never taken from the server. The counter keeps ids unique within one
/// millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonic source of [`MessageId`]s for one channel.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    counter: AtomicU64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, now: DateTime<Utc>) -> MessageId {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        MessageId(format!("{}-{counter}", now.timestamp_millis()))
    }
}

/// A chat message as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// The signed-in identity used for outgoing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ChatUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }
}

/// Frames received from the chat server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Message {
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        avatar: Option<String>,
        #[serde(default)]
        text: String,
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// Any other frame type; ignored.
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Turn a message frame into a [`ChatMessage`]; other frames yield `None`.
    pub fn into_message(
        self,
        ids: &MessageIdGenerator,
        received_at: DateTime<Utc>,
    ) -> Option<ChatMessage> {
        match self {
            Self::Message {
                username,
                avatar,
                text,
                timestamp,
            } => Some(ChatMessage {
                id: ids.next_id(received_at),
                author: username.unwrap_or_default(),
                avatar_ref: avatar.filter(|a| !a.is_empty()),
                text,
                sent_at: timestamp
                    .as_deref()
                    .and_then(parse_timestamp)
                    .unwrap_or(received_at),
            }),
            Self::Unknown => None,
        }
    }
}

/// Parse a server timestamp: RFC 3339, or naive ISO-8601 read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Frame sent to the chat server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "message")]
pub struct OutboundFrame {
    pub text: String,
    pub username: String,
    pub avatar: Option<String>,
}

impl OutboundFrame {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Validate an outgoing message for `user` and build its frame.
///
/// Whether the channel is open is checked by the channel itself.
pub fn validate_outgoing(
    text: &str,
    user: Option<&ChatUser>,
) -> Result<OutboundFrame, SendRejected> {
    let user = user.ok_or(SendRejected::Unauthenticated)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(SendRejected::Empty);
    }
    let length = text.chars().count();
    if length > MAX_MESSAGE_CHARS {
        return Err(SendRejected::TooLong {
            length,
            limit: MAX_MESSAGE_CHARS,
        });
    }
    Ok(OutboundFrame {
        text: text.to_string(),
        username: user.username.clone(),
        avatar: user.avatar_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_ids_are_unique_within_one_millisecond() {
        let ids = MessageIdGenerator::new();
        let a = ids.next_id(now());
        let b = ids.next_id(now());
        assert_ne!(a, b);
        assert_eq!(a.as_str(), format!("{}-1", now().timestamp_millis()));
        assert_eq!(b.as_str(), format!("{}-2", now().timestamp_millis()));
    }

    #[test]
    fn test_message_frame_becomes_chat_message() {
        let frame = InboundFrame::parse(
            r#"{"type":"message","username":"alice","avatar":null,"text":"hi","timestamp":"2024-05-01T11:59:58.123456"}"#,
        )
        .unwrap();
        let message = frame
            .into_message(&MessageIdGenerator::new(), now())
            .unwrap();
        assert_eq!(message.author, "alice");
        assert_eq!(message.text, "hi");
        assert!(message.avatar_ref.is_none());
        assert_eq!(
            message.sent_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 11, 59, 58).unwrap()
                + chrono::Duration::microseconds(123_456)
        );
    }

    #[test]
    fn test_unknown_frame_type_is_ignored() {
        let frame = InboundFrame::parse(r#"{"type":"presence","count":3}"#).unwrap();
        assert_eq!(frame, InboundFrame::Unknown);
        assert!(
            frame
                .into_message(&MessageIdGenerator::new(), now())
                .is_none()
        );
    }

    #[test]
    fn test_malformed_frames_fail_to_parse() {
        assert!(InboundFrame::parse("not json").is_err());
        assert!(InboundFrame::parse(r#"{"text":"no type"}"#).is_err());
        assert!(InboundFrame::parse(r#"{"type":"message","text":"#).is_err());
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(
            parse_timestamp("2024-05-01T12:00:00Z"),
            Some(now())
        );
        assert_eq!(
            parse_timestamp("2024-05-01T14:00:00+02:00"),
            Some(now())
        );
        assert_eq!(parse_timestamp("2024-05-01T12:00:00"), Some(now()));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_unparsable_timestamp_falls_back_to_receive_time() {
        let frame = InboundFrame::parse(
            r#"{"type":"message","username":"bob","text":"yo","timestamp":"soon"}"#,
        )
        .unwrap();
        let message = frame
            .into_message(&MessageIdGenerator::new(), now())
            .unwrap();
        assert_eq!(message.sent_at, now());
    }

    #[test]
    fn test_outbound_frame_shape() {
        let user = ChatUser::new("alice").with_avatar("/avatars/a.png");
        let frame = validate_outgoing("  hello  ", Some(&user)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "message",
                "text": "hello",
                "username": "alice",
                "avatar": "/avatars/a.png",
            })
        );
    }

    #[test]
    fn test_outgoing_validation() {
        let user = ChatUser::new("alice");
        assert_eq!(
            validate_outgoing("hi", None),
            Err(SendRejected::Unauthenticated)
        );
        assert_eq!(validate_outgoing("", Some(&user)), Err(SendRejected::Empty));
        assert_eq!(
            validate_outgoing("   ", Some(&user)),
            Err(SendRejected::Empty)
        );

        let at_limit = "a".repeat(MAX_MESSAGE_CHARS);
        assert!(validate_outgoing(&at_limit, Some(&user)).is_ok());

        let over = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(
            validate_outgoing(&over, Some(&user)),
            Err(SendRejected::TooLong {
                length: 501,
                limit: 500
            })
        );

        // Characters, not bytes.
        let wide = "я".repeat(MAX_MESSAGE_CHARS);
        assert!(validate_outgoing(&wide, Some(&user)).is_ok());
    }
}
