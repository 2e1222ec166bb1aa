//! Live chat clients.
//!
//! Connects to Twitch chat (IRC over WebSocket) and YouTube live chat
//! (innertube polling) and yields a uniform stream of [`ChatItem`]s.

pub mod error;
pub mod event;
pub mod http;
pub mod message;
pub mod provider;
pub mod registry;
pub mod twitch;
pub mod websocket;
pub mod youtube;

pub use error::{ChatError, Result};
pub use event::{ChatControlEvent, ChatItem};
pub use http::{default_client, install_rustls_provider};
pub use message::ChatMessage;
pub use provider::{ChatConnection, ChatProvider, ConnectionConfig, ReconnectConfig};
pub use registry::ProviderRegistry;
pub use twitch::{TwitchChatProtocol, TwitchChatProvider, TwitchCredentials, normalize_channel};
pub use websocket::{ChatProtocol, Decoded, WebSocketChatProvider};
pub use youtube::{LiveStream, YouTubeChatProvider, YouTubeDiscovery};
