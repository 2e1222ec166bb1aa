//! Chat provider trait and connection types.
//!
//! Defines the interface for platform-specific chat providers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::event::ChatItem;

/// How long `close()` waits for the transport task before aborting it.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Reconnect settings for transports that retry on their own.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectConfig {
    pub max_reconnect_attempts: u32,
    pub base_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 10,
            base_reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 60000,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect attempt `attempt` (1-based), doubling up to the cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_reconnect_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_reconnect_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Configuration for establishing a chat connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Transport-level reconnect settings (provider default when `None`)
    pub reconnect: Option<ReconnectConfig>,
}

impl ConnectionConfig {
    /// Set reconnect configuration.
    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = Some(config);
        self
    }
}

/// Handle for an active chat stream.
///
/// Owns the receiving end of the transport task. Dropping the connection
/// aborts the transport.
#[derive(Debug)]
pub struct ChatConnection {
    /// Unique connection ID
    pub id: String,
    /// Platform identifier
    pub platform: String,
    /// Channel name, video ID or room ID
    pub room_id: String,
    /// Connection start time
    pub connected_at: DateTime<Utc>,
    items: mpsc::Receiver<ChatItem>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChatConnection {
    /// Wrap a running transport task.
    pub fn new(
        platform: impl Into<String>,
        room_id: impl Into<String>,
        items: mpsc::Receiver<ChatItem>,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        let platform = platform.into();
        let room_id = room_id.into();
        Self {
            id: format!("{}-{}-{}", platform, room_id, uuid::Uuid::new_v4()),
            platform,
            room_id,
            connected_at: Utc::now(),
            items,
            shutdown,
            task: Some(task),
        }
    }

    /// Receive the next item.
    ///
    /// Returns `None` once the transport has given up (reconnects exhausted or
    /// unrecoverable error). The call is cancel-safe.
    pub async fn next_item(&mut self) -> Option<ChatItem> {
        self.items.recv().await
    }

    /// Ask the transport to stop and wait briefly for it to release the socket.
    pub async fn close(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(CLOSE_TIMEOUT, task).await.is_err() {
                debug!(connection = %self.id, "transport did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}

impl Drop for ChatConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Trait for platform-specific chat providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Get the platform name this provider handles.
    fn platform(&self) -> &str;

    /// Start a transport for a room and return a handle to its item stream.
    ///
    /// The returned connection may still be establishing; a `Connected`
    /// control item is yielded once the room is joined.
    async fn connect(&self, room_id: &str, config: ConnectionConfig) -> Result<ChatConnection>;
}
