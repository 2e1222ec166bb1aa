//! Outbound notifications.
//!
//! Mentions are queued on a [`NotificationSink`] and delivered one at a time
//! through a [`NotificationChannel`] by the [`DeliveryWorker`].

mod channel;
mod sink;
mod telegram;

pub use channel::NotificationChannel;
pub use sink::{DeliveryWorker, NotificationSink, OutboundMessage, notification_queue};
pub use telegram::{TelegramChannel, TelegramConfig};
