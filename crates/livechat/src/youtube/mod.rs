//! YouTube support: channel and broadcast discovery plus live chat polling.

pub mod chat;
pub mod discovery;

pub use chat::{ChatPage, ChatSession, YouTubeChatProvider, parse_chat_page};
pub use discovery::{LiveStream, YouTubeDiscovery};
