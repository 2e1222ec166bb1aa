//! YouTube live chat over the innertube polling API.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use regex::Regex;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::event::{ChatControlEvent, ChatItem};
use crate::message::ChatMessage;
use crate::provider::{ChatConnection, ChatProvider, ConnectionConfig, ReconnectConfig};

const YOUTUBE_BASE: &str = "https://www.youtube.com";
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[allow(clippy::expect_used)]
static API_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""INNERTUBE_API_KEY":"([^"]+)""#).expect("valid api key regex")
});
#[allow(clippy::expect_used)]
static CLIENT_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:INNERTUBE_CLIENT_VERSION|clientVersion)":"([\d.]+)""#)
        .expect("valid client version regex")
});
#[allow(clippy::expect_used)]
static CONTINUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""continuation":"([^"]+)""#).expect("valid continuation regex")
});

/// Session parameters scraped from the live chat page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub api_key: String,
    pub client_version: String,
    pub continuation: String,
}

impl ChatSession {
    /// Extract the session from the `live_chat` page HTML.
    pub fn from_page(html: &str) -> Option<Self> {
        let capture = |re: &Regex| {
            re.captures(html)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        };
        Some(Self {
            api_key: capture(&API_KEY)?,
            client_version: capture(&CLIENT_VERSION)?,
            continuation: capture(&CONTINUATION)?,
        })
    }
}

/// One page of a `get_live_chat` response.
#[derive(Debug, Default)]
pub struct ChatPage {
    pub messages: Vec<ChatMessage>,
    /// Continuation for the next poll; `None` once the broadcast ended.
    pub continuation: Option<String>,
    /// Server-suggested wait before the next poll.
    pub timeout: Option<Duration>,
}

/// Flatten a `runs` array into text, rendering emojis by their shortcut.
fn runs_to_text(runs: &[Value]) -> String {
    runs.iter()
        .map(|run| {
            if let Some(text) = run.get("text").and_then(Value::as_str) {
                return text.to_string();
            }
            let emoji = run.get("emoji");
            emoji
                .and_then(|e| e.pointer("/shortcuts/0"))
                .or_else(|| emoji.and_then(|e| e.get("emojiId")))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

fn parse_renderer(renderer: &Value) -> Option<ChatMessage> {
    let id = renderer.get("id")?.as_str()?;
    let author = renderer
        .pointer("/authorName/simpleText")
        .and_then(Value::as_str)
        .unwrap_or("Unknown");
    let user_id = renderer
        .get("authorExternalChannelId")
        .and_then(Value::as_str)
        .unwrap_or(author);
    let content = renderer
        .pointer("/message/runs")
        .and_then(Value::as_array)
        .map(|runs| runs_to_text(runs))
        .unwrap_or_default();

    let mut message = ChatMessage::new(id, user_id, author, content);
    if let Some(ts) = renderer
        .get("timestampUsec")
        .and_then(Value::as_str)
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|usec| Utc.timestamp_micros(usec).single())
    {
        message = message.with_timestamp(ts);
    }
    Some(message)
}

/// Parse a `get_live_chat` response body.
pub fn parse_chat_page(body: &Value) -> ChatPage {
    let Some(contents) = body.pointer("/continuationContents/liveChatContinuation") else {
        return ChatPage::default();
    };

    let messages = contents
        .get("actions")
        .and_then(Value::as_array)
        .map(|actions| {
            actions
                .iter()
                .filter_map(|action| action.pointer("/addChatItemAction/item"))
                .filter_map(|item| {
                    item.get("liveChatTextMessageRenderer")
                        .or_else(|| item.get("liveChatPaidMessageRenderer"))
                })
                .filter_map(parse_renderer)
                .collect()
        })
        .unwrap_or_default();

    let continuation_data = contents.pointer("/continuations/0").and_then(|c| {
        [
            "invalidationContinuationData",
            "timedContinuationData",
            "reloadContinuationData",
        ]
        .iter()
        .find_map(|key| c.get(*key))
    });

    let continuation = continuation_data
        .and_then(|d| d.get("continuation"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let timeout = continuation_data
        .and_then(|d| d.get("timeoutMs"))
        .and_then(Value::as_u64)
        .map(Duration::from_millis);

    ChatPage {
        messages,
        continuation,
        timeout,
    }
}

fn clamp_poll_interval(timeout: Option<Duration>) -> Duration {
    timeout
        .unwrap_or(MIN_POLL_INTERVAL)
        .clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

/// Live chat provider for YouTube. The room id is the video id.
#[derive(Debug, Clone)]
pub struct YouTubeChatProvider {
    client: Client,
    base_url: String,
    config: ReconnectConfig,
}

impl YouTubeChatProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: YOUTUBE_BASE.to_string(),
            config: ReconnectConfig::default(),
        }
    }

    /// Point the provider at another host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.config = config;
        self
    }

    async fn open_session(&self, video_id: &str) -> Result<ChatSession> {
        let url = format!("{}/live_chat?is_popout=1&v={}", self.base_url, video_id);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::connection(format!(
                "live chat page returned {}",
                status
            )));
        }
        let html = response.text().await?;
        ChatSession::from_page(&html)
            .ok_or_else(|| ChatError::protocol(format!("live chat unavailable for {}", video_id)))
    }
}

struct Poller {
    client: Client,
    base_url: String,
    session: ChatSession,
}

impl Poller {
    async fn poll(&self) -> Result<ChatPage> {
        let url = format!(
            "{}/youtubei/v1/live_chat/get_live_chat?key={}&prettyPrint=false",
            self.base_url, self.session.api_key
        );
        let body = json!({
            "context": {
                "client": {
                    "clientName": "WEB",
                    "clientVersion": self.session.client_version,
                }
            },
            "continuation": self.session.continuation,
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::connection(format!(
                "get_live_chat returned {}",
                status
            )));
        }
        let value: Value = response.json().await?;
        Ok(parse_chat_page(&value))
    }
}

async fn run_poller(
    mut poller: Poller,
    video_id: String,
    config: ReconnectConfig,
    item_tx: mpsc::Sender<ChatItem>,
    shutdown: CancellationToken,
) {
    let mut first_page = true;
    let mut attempt: u32 = 0;

    if item_tx
        .send(ChatItem::Control(ChatControlEvent::Connected))
        .await
        .is_err()
    {
        return;
    }

    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = poller.poll() => result,
        };

        let wait = match result {
            Ok(page) => {
                if attempt > 0 {
                    attempt = 0;
                    if item_tx
                        .send(ChatItem::Control(ChatControlEvent::Connected))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }

                let Some(next) = page.continuation else {
                    info!("YouTube live chat ended for {}", video_id);
                    let closed = ChatControlEvent::StreamClosed {
                        message: Some("live chat ended".to_string()),
                    };
                    let _ = item_tx.send(ChatItem::Control(closed)).await;
                    break;
                };
                poller.session.continuation = next;

                // The first page replays recent history
                if first_page {
                    debug!("Skipping {} backlog messages for {}", page.messages.len(), video_id);
                    first_page = false;
                } else {
                    for message in page.messages {
                        if item_tx.send(ChatItem::Message(message)).await.is_err() {
                            return;
                        }
                    }
                }
                clamp_poll_interval(page.timeout)
            }
            Err(e) => {
                warn!("YouTube live chat poll failed for {}: {}", video_id, e);
                if attempt >= config.max_reconnect_attempts {
                    warn!("Max reconnect attempts reached for {}", video_id);
                    break;
                }
                attempt += 1;
                if item_tx
                    .send(ChatItem::Control(ChatControlEvent::Reconnecting { attempt }))
                    .await
                    .is_err()
                {
                    break;
                }
                config.delay_for_attempt(attempt)
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }
    debug!("YouTube poller for {} stopped", video_id);
}

#[async_trait]
impl ChatProvider for YouTubeChatProvider {
    fn platform(&self) -> &str {
        "youtube"
    }

    async fn connect(&self, room_id: &str, config: ConnectionConfig) -> Result<ChatConnection> {
        let session = self.open_session(room_id).await?;
        debug!(
            video_id = room_id,
            client_version = %session.client_version,
            "Opened YouTube chat session"
        );

        let poller = Poller {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session,
        };

        let (item_tx, item_rx) = mpsc::channel(256);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_poller(
            poller,
            room_id.to_string(),
            config.reconnect.unwrap_or(self.config),
            item_tx,
            shutdown.clone(),
        ));

        Ok(ChatConnection::new(
            self.platform().to_string(),
            room_id,
            item_rx,
            shutdown,
            task,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_action(id: &str, author: &str, runs: Value) -> Value {
        json!({
            "addChatItemAction": {
                "item": {
                    "liveChatTextMessageRenderer": {
                        "id": id,
                        "authorName": { "simpleText": author },
                        "authorExternalChannelId": format!("UC-{}", author),
                        "timestampUsec": "1700000000123456",
                        "message": { "runs": runs }
                    }
                }
            }
        })
    }

    #[test]
    fn test_session_from_page() {
        let html = r#"ytcfg.set({"INNERTUBE_API_KEY":"AIzaKey","INNERTUBE_CLIENT_VERSION":"2.20240101.00.00"});
            {"continuation":"0ofMyAN"}"#;
        let session = ChatSession::from_page(html).unwrap();

        assert_eq!(session.api_key, "AIzaKey");
        assert_eq!(session.client_version, "2.20240101.00.00");
        assert_eq!(session.continuation, "0ofMyAN");
        assert!(ChatSession::from_page("<html>no chat</html>").is_none());
    }

    #[test]
    fn test_parse_chat_page() {
        let body = json!({
            "continuationContents": {
                "liveChatContinuation": {
                    "continuations": [{
                        "invalidationContinuationData": {
                            "continuation": "next-token",
                            "timeoutMs": 5000
                        }
                    }],
                    "actions": [
                        text_action("m1", "Alice", json!([
                            { "text": "hi @bob " },
                            { "emoji": { "emojiId": "x", "shortcuts": [":wave:"] } }
                        ])),
                        { "markChatItemAsDeletedAction": {} },
                        text_action("m2", "Carol", json!([{ "text": "hello" }]))
                    ]
                }
            }
        });

        let page = parse_chat_page(&body);
        assert_eq!(page.continuation.as_deref(), Some("next-token"));
        assert_eq!(page.timeout, Some(Duration::from_millis(5000)));
        assert_eq!(page.messages.len(), 2);

        let first = &page.messages[0];
        assert_eq!(first.id, "m1");
        assert_eq!(first.username, "Alice");
        assert_eq!(first.user_id, "UC-Alice");
        assert_eq!(first.content, "hi @bob :wave:");
        assert_eq!(first.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_parse_chat_page_without_continuation_means_ended() {
        let page = parse_chat_page(&json!({ "responseContext": {} }));
        assert!(page.continuation.is_none());
        assert!(page.messages.is_empty());

        let page = parse_chat_page(&json!({
            "continuationContents": { "liveChatContinuation": { "actions": [] } }
        }));
        assert!(page.continuation.is_none());
    }

    #[test]
    fn test_clamp_poll_interval() {
        assert_eq!(clamp_poll_interval(None), MIN_POLL_INTERVAL);
        assert_eq!(
            clamp_poll_interval(Some(Duration::from_millis(10))),
            MIN_POLL_INTERVAL
        );
        assert_eq!(
            clamp_poll_interval(Some(Duration::from_secs(30))),
            MAX_POLL_INTERVAL
        );
        assert_eq!(
            clamp_poll_interval(Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
    }
}
