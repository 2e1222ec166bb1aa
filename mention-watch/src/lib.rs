//! Live chat mention watcher.
//!
//! Watches Twitch and YouTube live chats for messages that mention a
//! username and forwards each match to a Telegram chat.

pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod panic_hook;
pub mod setup;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
