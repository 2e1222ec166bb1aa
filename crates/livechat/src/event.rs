//! Typed items yielded by a chat connection.
//!
//! A connection yields either regular chat messages or control events that
//! describe the transport state. Control events are never mention candidates.

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

/// Control events produced by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatControlEvent {
    /// The transport is connected and joined to the room.
    Connected,
    /// The transport lost its connection and is retrying on its own.
    Reconnecting { attempt: u32 },
    /// The live stream ended / the chat was closed by the platform.
    StreamClosed {
        /// Optional human-readable reason provided by the platform.
        message: Option<String>,
    },
}

/// A single item in the chat stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatItem {
    Message(ChatMessage),
    Control(ChatControlEvent),
}

impl From<ChatMessage> for ChatItem {
    fn from(message: ChatMessage) -> Self {
        Self::Message(message)
    }
}

impl From<ChatControlEvent> for ChatItem {
    fn from(control: ChatControlEvent) -> Self {
        Self::Control(control)
    }
}
