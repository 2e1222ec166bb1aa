//! Chat message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID (platform-specific)
    pub id: String,
    /// User ID of the sender
    pub user_id: String,
    /// Display name of the sender
    pub username: String,
    /// Message content
    pub content: String,
    /// Timestamp when the message was sent
    pub timestamp: DateTime<Utc>,
    /// Whether the message was sent by the identity this client is logged in as
    #[serde(default)]
    pub from_self: bool,
}

impl ChatMessage {
    /// Create a new chat message stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            username: username.into(),
            content: content.into(),
            timestamp: Utc::now(),
            from_self: false,
        }
    }

    /// Set the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Mark the message as authored by ourselves.
    pub fn from_self(mut self, from_self: bool) -> Self {
        self.from_self = from_self;
        self
    }

    /// Timestamp in milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_chat_message_new() {
        let msg = ChatMessage::new("1", "user1", "TestUser", "Hello world!");

        assert_eq!(msg.id, "1");
        assert_eq!(msg.user_id, "user1");
        assert_eq!(msg.username, "TestUser");
        assert_eq!(msg.content, "Hello world!");
        assert!(!msg.from_self);
    }

    #[test]
    fn test_chat_message_builders() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let msg = ChatMessage::new("1", "u", "User", "hi")
            .with_timestamp(ts)
            .from_self(true);

        assert!(msg.from_self);
        assert_eq!(msg.timestamp_millis(), 1_700_000_000_123);
    }
}
