//! Events produced by channel monitors.

use std::fmt;

use tokio::sync::mpsc;

/// Chat platforms a source can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlatformKind {
    Twitch,
    YouTube,
}

impl PlatformKind {
    /// Lowercase identifier used in logs and provider lookup.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitch => "twitch",
            Self::YouTube => "youtube",
        }
    }

    /// Human-readable name used in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Twitch => "Twitch",
            Self::YouTube => "YouTube",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of a watched source: one channel on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey {
    pub platform: PlatformKind,
    pub channel: String,
}

impl SourceKey {
    pub fn new(platform: PlatformKind, channel: impl Into<String>) -> Self {
        Self {
            platform,
            channel: channel.into(),
        }
    }

    pub fn twitch(channel: impl Into<String>) -> Self {
        Self::new(PlatformKind::Twitch, channel)
    }

    pub fn youtube(channel: impl Into<String>) -> Self {
        Self::new(PlatformKind::YouTube, channel)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform.label(), self.channel)
    }
}

/// Something that happened inside a monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Connected {
        source: SourceKey,
    },
    Reconnecting {
        source: SourceKey,
    },
    Info {
        source: SourceKey,
        text: String,
    },
    Mention {
        source: SourceKey,
        author: String,
        text: String,
        timestamp_ms: i64,
    },
    Failed {
        source: SourceKey,
        error: String,
    },
}

impl MonitorEvent {
    /// Source that produced the event.
    pub fn source(&self) -> &SourceKey {
        match self {
            Self::Connected { source }
            | Self::Reconnecting { source }
            | Self::Info { source, .. }
            | Self::Mention { source, .. }
            | Self::Failed { source, .. } => source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Info { .. } => "info",
            Self::Mention { .. } => "mention",
            Self::Failed { .. } => "failed",
        }
    }
}

/// An event stamped with the generation of the monitor that emitted it.
#[derive(Debug, Clone)]
pub struct EmittedEvent {
    pub generation: u64,
    pub event: MonitorEvent,
}

/// Event sender bound to a single source and monitor generation.
///
/// Every event built through an emitter carries the emitter's source key, so
/// a monitor can only ever report about the source it was created for.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    source: SourceKey,
    generation: u64,
    tx: mpsc::UnboundedSender<EmittedEvent>,
}

impl EventEmitter {
    pub fn new(
        source: SourceKey,
        generation: u64,
        tx: mpsc::UnboundedSender<EmittedEvent>,
    ) -> Self {
        Self {
            source,
            generation,
            tx,
        }
    }

    pub fn source(&self) -> &SourceKey {
        &self.source
    }

    /// Returns `false` once the supervisor stopped listening.
    fn emit(&self, event: MonitorEvent) -> bool {
        self.tx
            .send(EmittedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn connected(&self) -> bool {
        self.emit(MonitorEvent::Connected {
            source: self.source.clone(),
        })
    }

    pub fn reconnecting(&self) -> bool {
        self.emit(MonitorEvent::Reconnecting {
            source: self.source.clone(),
        })
    }

    pub fn info(&self, text: impl Into<String>) -> bool {
        self.emit(MonitorEvent::Info {
            source: self.source.clone(),
            text: text.into(),
        })
    }

    pub fn mention(
        &self,
        author: impl Into<String>,
        text: impl Into<String>,
        timestamp_ms: i64,
    ) -> bool {
        self.emit(MonitorEvent::Mention {
            source: self.source.clone(),
            author: author.into(),
            text: text.into(),
            timestamp_ms,
        })
    }

    pub fn failed(&self, error: impl Into<String>) -> bool {
        self.emit(MonitorEvent::Failed {
            source: self.source.clone(),
            error: error.into(),
        })
    }
}
