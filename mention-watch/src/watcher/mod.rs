//! Multi-source chat watching.

pub mod events;
pub mod mention;
pub mod monitor;
pub mod supervisor;

pub use events::{EmittedEvent, EventEmitter, MonitorEvent, PlatformKind, SourceKey};
pub use mention::MentionMatcher;
pub use monitor::{
    ChannelMonitor, MonitorFactory, PlatformMonitorFactory, TwitchMonitor, YouTubeMonitor,
};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorStatus, format_mention};
