//! Twitch chat provider.
//!
//! Implements chat collection for Twitch using IRC over WebSocket.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use regex::Regex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

use crate::error::Result;
use crate::event::ChatItem;
use crate::message::ChatMessage;
use crate::provider::ReconnectConfig;
use crate::websocket::{ChatProtocol, Decoded, WebSocketChatProvider};

/// Twitch WebSocket IRC server URL
const TWITCH_WS_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

#[allow(clippy::expect_used)]
pub static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.|m\.)?twitch\.tv/([^/?#]+)")
        .expect("valid twitch url regex")
});

#[allow(clippy::expect_used)]
static CHANNEL_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]{1,25}$").expect("valid channel name regex"));

/// Normalize a configured channel (`Name`, `#name`, `twitch.tv/name` URL) to
/// the lowercase login Twitch uses in IRC.
pub fn normalize_channel(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let name = URL_REGEX
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed)
        .trim_start_matches('#')
        .to_lowercase();

    CHANNEL_NAME_REGEX.is_match(&name).then_some(name)
}

/// Static credentials for an authenticated session.
#[derive(Clone)]
pub struct TwitchCredentials {
    pub login: String,
    pub oauth_token: String,
}

impl std::fmt::Debug for TwitchCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitchCredentials")
            .field("login", &self.login)
            .field("oauth_token", &"<redacted>")
            .finish()
    }
}

/// Twitch IRC protocol implementation.
#[derive(Clone, Debug)]
pub struct TwitchChatProtocol {
    nick: String,
    oauth_token: Option<String>,
}

impl Default for TwitchChatProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl TwitchChatProtocol {
    /// Create an anonymous (read-only) session.
    pub fn new() -> Self {
        Self {
            nick: Self::generate_anonymous_nick(),
            oauth_token: None,
        }
    }

    /// Create a session logged in as `credentials.login`.
    pub fn with_credentials(credentials: TwitchCredentials) -> Self {
        Self {
            nick: credentials.login.trim().to_lowercase(),
            oauth_token: Some(credentials.oauth_token),
        }
    }

    /// The login this session identifies as.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    fn generate_anonymous_nick() -> String {
        let random_num: u32 = rand::random::<u32>() % 100000;
        format!("justinfan{}", random_num)
    }

    fn pass_line(&self) -> String {
        match self.oauth_token.as_deref() {
            Some(token) if token.starts_with("oauth:") => format!("PASS {}", token),
            Some(token) => format!("PASS oauth:{}", token),
            None => "PASS SCHMOOPIIE".to_string(),
        }
    }

    /// Parse a single PRIVMSG line into a chat message.
    fn parse_privmsg(&self, line: &str) -> Option<ChatMessage> {
        let (tags, remaining) = split_tags(line);

        // :user!user@user.tmi.twitch.tv PRIVMSG #channel :message
        let mut parts = remaining.splitn(4, ' ');
        let prefix = parts.next()?;
        if parts.next()? != "PRIVMSG" {
            return None;
        }
        let _channel = parts.next()?;
        let trailing = parts.next()?;
        let content = trailing.strip_prefix(':').unwrap_or(trailing);

        let login = prefix
            .strip_prefix(':')
            .and_then(|s| s.split('!').next())
            .unwrap_or("unknown");

        let display_name = tags
            .get("display-name")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| login.to_string());
        let user_id = tags
            .get("user-id")
            .cloned()
            .unwrap_or_else(|| login.to_string());
        let message_id = tags
            .get("id")
            .cloned()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut message = ChatMessage::new(message_id, user_id, display_name, content.trim())
            .from_self(login.eq_ignore_ascii_case(&self.nick));

        if let Some(ts) = tags
            .get("tmi-sent-ts")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        {
            message = message.with_timestamp(ts);
        }

        Some(message)
    }
}

/// Split the IRCv3 tag section off a line.
fn split_tags(line: &str) -> (HashMap<&str, String>, &str) {
    let mut tags = HashMap::new();
    let Some(rest) = line.strip_prefix('@') else {
        return (tags, line);
    };
    let Some((tag_str, remaining)) = rest.split_once(' ') else {
        return (tags, line);
    };

    for tag in tag_str.split(';') {
        if let Some((key, value)) = tag.split_once('=') {
            tags.insert(key, unescape_tag_value(value));
        }
    }
    (tags, remaining)
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// IRC command of a line, skipping tags and prefix.
fn command_of(line: &str) -> Option<&str> {
    let (_, rest) = split_tags(line);
    let rest = if rest.starts_with(':') {
        rest.split_once(' ')?.1
    } else {
        rest
    };
    rest.split(' ').next()
}

#[async_trait]
impl ChatProtocol for TwitchChatProtocol {
    fn platform(&self) -> &str {
        "twitch"
    }

    async fn websocket_url(&self, _room_id: &str) -> Result<String> {
        Ok(TWITCH_WS_URL.to_string())
    }

    async fn handshake_messages(&self, room_id: &str) -> Result<Vec<Message>> {
        let channel = if room_id.starts_with('#') {
            room_id.to_lowercase()
        } else {
            format!("#{}", room_id.to_lowercase())
        };

        Ok(vec![
            Message::Text("CAP REQ :twitch.tv/tags twitch.tv/commands".into()),
            Message::Text(self.pass_line().into()),
            Message::Text(format!("NICK {}", self.nick).into()),
            Message::Text(format!("JOIN {}", channel).into()),
        ])
    }

    async fn decode_message(
        &self,
        message: &Message,
        room_id: &str,
        tx: &mpsc::Sender<Message>,
    ) -> Result<Decoded> {
        match message {
            Message::Text(text) => {
                let mut decoded = Decoded::default();

                // Twitch may send multiple lines in one frame
                for line in text.lines() {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some(data) = trimmed.strip_prefix("PING") {
                        let target = if data.is_empty() {
                            " :tmi.twitch.tv"
                        } else {
                            data
                        };
                        let pong = format!("PONG{}", target);
                        debug!("Sending PONG: {}", pong);
                        let _ = tx.send(Message::Text(pong.into())).await;
                        continue;
                    }

                    match command_of(trimmed) {
                        Some("PRIVMSG") => {
                            if let Some(msg) = self.parse_privmsg(trimmed) {
                                decoded.items.push(ChatItem::Message(msg));
                            }
                        }
                        Some("RECONNECT") => decoded.reconnect = true,
                        Some("NOTICE") => warn!("Twitch notice for {}: {}", room_id, trimmed),
                        _ => {}
                    }
                }

                Ok(decoded)
            }
            Message::Ping(data) => {
                let _ = tx.send(Message::Pong(data.clone())).await;
                Ok(Decoded::default())
            }
            Message::Close(frame) => {
                debug!("Twitch closed the socket for {}: {:?}", room_id, frame);
                Ok(Decoded {
                    items: vec![],
                    reconnect: true,
                })
            }
            _ => Ok(Decoded::default()),
        }
    }
}

/// Twitch chat provider type alias.
pub type TwitchChatProvider = WebSocketChatProvider<TwitchChatProtocol>;

/// Creates a Twitch chat provider, anonymous unless credentials are given.
pub fn create_twitch_chat_provider(
    credentials: Option<TwitchCredentials>,
    reconnect: Option<ReconnectConfig>,
) -> TwitchChatProvider {
    let protocol = match credentials {
        Some(credentials) => TwitchChatProtocol::with_credentials(credentials),
        None => TwitchChatProtocol::new(),
    };
    WebSocketChatProvider::with_protocol(protocol, reconnect)
}
