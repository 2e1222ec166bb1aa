use async_trait::async_trait;

use crate::Result;

/// A destination that accepts plain text notifications.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Make a single delivery attempt.
    async fn send(&self, text: &str) -> Result<()>;
}
