//! Channel monitors.
//!
//! A monitor owns the chat connection of one source, narrates what happens on
//! it through its [`EventEmitter`] and reports mentions. It reconnects on its
//! own while it can and emits `Failed` before returning when it cannot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use livechat::{
    ChatConnection, ChatControlEvent, ChatItem, ChatMessage, ChatProvider, ConnectionConfig,
    ProviderRegistry, YouTubeDiscovery,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::events::{EventEmitter, PlatformKind, SourceKey};
use super::mention::MentionMatcher;
use crate::config::Config;
use crate::{Error, Result};

/// Wait before looking for the next broadcast when a channel is offline.
const YOUTUBE_IDLE_WAIT: Duration = Duration::from_secs(2 * 60);
/// Wait before retrying after a discovery error.
const YOUTUBE_ERROR_WAIT: Duration = Duration::from_secs(5 * 60);

/// A long-running watcher of one chat source.
#[async_trait]
pub trait ChannelMonitor: Send {
    /// Run until cancelled or until the source cannot be watched any more.
    async fn run(self: Box<Self>, emitter: EventEmitter, cancel: CancellationToken);
}

/// Creates a fresh monitor for a source. Called on start and on every restart.
pub trait MonitorFactory: Send + Sync {
    fn create(&self, source: &SourceKey) -> Box<dyn ChannelMonitor>;
}

/// How a chat connection stopped yielding items.
#[derive(Debug, PartialEq, Eq)]
enum PumpEnd {
    Cancelled,
    /// The platform closed the chat (broadcast ended).
    StreamClosed,
    /// The transport gave up reconnecting.
    Exhausted,
}

/// Translate one chat item into monitor events. Returns `Some` when the
/// connection reported that the stream is over.
fn handle_item(
    item: ChatItem,
    matcher: &MentionMatcher,
    emitter: &EventEmitter,
) -> Option<PumpEnd> {
    match item {
        ChatItem::Message(message) => {
            handle_message(message, matcher, emitter);
            None
        }
        ChatItem::Control(ChatControlEvent::Connected) => {
            emitter.connected();
            None
        }
        ChatItem::Control(ChatControlEvent::Reconnecting { attempt }) => {
            debug!(source = %emitter.source(), attempt, "Chat transport reconnecting");
            emitter.reconnecting();
            None
        }
        ChatItem::Control(ChatControlEvent::StreamClosed { message }) => {
            debug!(source = %emitter.source(), reason = ?message, "Chat closed");
            Some(PumpEnd::StreamClosed)
        }
    }
}

fn handle_message(message: ChatMessage, matcher: &MentionMatcher, emitter: &EventEmitter) {
    if message.from_self {
        return;
    }

    emitter.info(format!("[{}]: {}", message.username, message.content));
    if matcher.is_match(&message.content) {
        let timestamp_ms = message.timestamp_millis();
        emitter.mention(message.username, message.content, timestamp_ms);
    }
}

/// Forward items from `connection` until it ends or `cancel` fires.
async fn pump_chat(
    connection: &mut ChatConnection,
    matcher: &MentionMatcher,
    emitter: &EventEmitter,
    cancel: &CancellationToken,
) -> PumpEnd {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return PumpEnd::Cancelled,

            item = connection.next_item() => {
                let Some(item) = item else {
                    return PumpEnd::Exhausted;
                };
                if let Some(end) = handle_item(item, matcher, emitter) {
                    return end;
                }
            }
        }
    }
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancel.
async fn wait_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Watches a Twitch chat room.
pub struct TwitchMonitor {
    channel: String,
    provider: Arc<dyn ChatProvider>,
    matcher: MentionMatcher,
}

impl TwitchMonitor {
    pub fn new(
        channel: impl Into<String>,
        provider: Arc<dyn ChatProvider>,
        matcher: MentionMatcher,
    ) -> Self {
        Self {
            channel: channel.into(),
            provider,
            matcher,
        }
    }
}

#[async_trait]
impl ChannelMonitor for TwitchMonitor {
    async fn run(self: Box<Self>, emitter: EventEmitter, cancel: CancellationToken) {
        let connect = self.provider.connect(&self.channel, ConnectionConfig::default());
        let mut connection = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connect => match result {
                Ok(connection) => connection,
                Err(e) => {
                    emitter.failed(format!("failed to connect: {}", e));
                    return;
                }
            },
        };

        match pump_chat(&mut connection, &self.matcher, &emitter, &cancel).await {
            PumpEnd::Cancelled => connection.close().await,
            PumpEnd::StreamClosed | PumpEnd::Exhausted => {
                emitter.failed("chat connection lost");
            }
        }
    }
}

/// Watches a YouTube channel: waits for a broadcast, follows its live chat,
/// then waits for the next one.
pub struct YouTubeMonitor {
    handle: String,
    discovery: YouTubeDiscovery,
    provider: Arc<dyn ChatProvider>,
    matcher: MentionMatcher,
    idle_wait: Duration,
    error_wait: Duration,
}

impl YouTubeMonitor {
    pub fn new(
        handle: impl Into<String>,
        discovery: YouTubeDiscovery,
        provider: Arc<dyn ChatProvider>,
        matcher: MentionMatcher,
    ) -> Self {
        Self {
            handle: handle.into(),
            discovery,
            provider,
            matcher,
            idle_wait: YOUTUBE_IDLE_WAIT,
            error_wait: YOUTUBE_ERROR_WAIT,
        }
    }

    /// Override the offline and error waits.
    pub fn with_waits(mut self, idle_wait: Duration, error_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self.error_wait = error_wait;
        self
    }

    /// Follow one broadcast. Returns `None` when cancelled, otherwise how long
    /// to wait before looking again.
    async fn watch_broadcast(
        &self,
        channel_id: &str,
        emitter: &EventEmitter,
        cancel: &CancellationToken,
    ) -> std::result::Result<Option<Duration>, String> {
        let found = tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            found = self.discovery.find_live_stream(channel_id) => found,
        };

        let stream = match found {
            Ok(Some(stream)) => stream,
            Ok(None) => {
                emitter.info("No active broadcast, waiting");
                return Ok(Some(self.idle_wait));
            }
            Err(e) => {
                emitter.info(format!("Broadcast lookup failed: {}", e));
                return Ok(Some(self.error_wait));
            }
        };

        let connect = self
            .provider
            .connect(&stream.video_id, ConnectionConfig::default());
        let mut connection = tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            result = connect => match result {
                Ok(connection) => connection,
                Err(e) => {
                    emitter.info(format!("Could not join the live chat: {}", e));
                    return Ok(Some(self.idle_wait));
                }
            },
        };

        emitter.info(format!(
            "LIVE: {} ({}) https://youtube.com/watch?v={}",
            stream.title, stream.channel_name, stream.video_id
        ));

        match pump_chat(&mut connection, &self.matcher, emitter, cancel).await {
            PumpEnd::Cancelled => {
                connection.close().await;
                Ok(None)
            }
            PumpEnd::StreamClosed => {
                emitter.info(format!(
                    "Broadcast \"{}\" ended, waiting for the next one",
                    stream.title
                ));
                Ok(Some(self.idle_wait))
            }
            PumpEnd::Exhausted => Err("live chat connection lost".to_string()),
        }
    }
}

#[async_trait]
impl ChannelMonitor for YouTubeMonitor {
    async fn run(self: Box<Self>, emitter: EventEmitter, cancel: CancellationToken) {
        let resolved = tokio::select! {
            _ = cancel.cancelled() => return,
            resolved = self.discovery.resolve_channel_id(&self.handle) => resolved,
        };
        let channel_id = match resolved {
            Ok(id) => id,
            Err(e) => {
                emitter.failed(format!("channel not found: {}", e));
                return;
            }
        };
        emitter.info(format!("Watching channel (ID: {})", channel_id));

        loop {
            let wait = match self.watch_broadcast(&channel_id, &emitter, &cancel).await {
                Ok(Some(wait)) => wait,
                Ok(None) => return,
                Err(error) => {
                    emitter.failed(error);
                    return;
                }
            };

            if !wait_or_cancel(wait, &cancel).await {
                return;
            }
            emitter.reconnecting();
        }
    }
}

/// Builds real Twitch and YouTube monitors.
pub struct PlatformMonitorFactory {
    twitch: Arc<dyn ChatProvider>,
    youtube: Arc<dyn ChatProvider>,
    discovery: YouTubeDiscovery,
    matcher: MentionMatcher,
}

impl PlatformMonitorFactory {
    pub fn new(
        registry: &ProviderRegistry,
        discovery: YouTubeDiscovery,
        matcher: MentionMatcher,
    ) -> Result<Self> {
        let provider = |platform: PlatformKind| {
            registry.get_by_platform(platform.as_str()).ok_or_else(|| {
                Error::config(format!("no chat provider registered for {}", platform))
            })
        };
        Ok(Self {
            twitch: provider(PlatformKind::Twitch)?,
            youtube: provider(PlatformKind::YouTube)?,
            discovery,
            matcher,
        })
    }

    /// Factory with the default providers for `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = ProviderRegistry::with_defaults(config.twitch_credentials.clone())?;
        let discovery = YouTubeDiscovery::new(livechat::default_client()?);
        Self::new(
            &registry,
            discovery,
            MentionMatcher::new(&config.watched_username),
        )
    }
}

impl MonitorFactory for PlatformMonitorFactory {
    fn create(&self, source: &SourceKey) -> Box<dyn ChannelMonitor> {
        match source.platform {
            PlatformKind::Twitch => Box::new(TwitchMonitor::new(
                source.channel.clone(),
                self.twitch.clone(),
                self.matcher.clone(),
            )),
            PlatformKind::YouTube => Box::new(YouTubeMonitor::new(
                source.channel.clone(),
                self.discovery.clone(),
                self.youtube.clone(),
                self.matcher.clone(),
            )),
        }
    }
}
