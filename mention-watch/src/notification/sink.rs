//! Serialized, rate-limited delivery queue.
//!
//! [`NotificationSink`] is the cheap, cloneable producer side. The
//! [`DeliveryWorker`] owns the consumer side and makes exactly one delivery
//! attempt per message, strictly in order, waiting the configured spacing
//! after every attempt.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::NotificationChannel;

/// A queued notification.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub text: String,
    pub enqueued_at: Instant,
}

/// Producer handle of the notification queue.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    depth: Arc<AtomicUsize>,
}

impl NotificationSink {
    /// Queue a message. Never blocks.
    pub fn enqueue(&self, text: impl Into<String>) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        let message = OutboundMessage {
            text: text.into(),
            enqueued_at: Instant::now(),
        };
        if self.tx.send(message).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            warn!("Delivery worker is gone, dropping notification");
        }
    }

    /// Messages whose delivery attempt has not finished yet.
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Consumer side of the notification queue.
#[derive(Debug)]
pub struct DeliveryWorker {
    task: JoinHandle<()>,
    drain: CancellationToken,
    depth: Arc<AtomicUsize>,
}

/// Create a queue delivering through `channel` and start its worker.
pub fn notification_queue(
    channel: Arc<dyn NotificationChannel>,
    spacing: Duration,
) -> (NotificationSink, DeliveryWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    let drain = CancellationToken::new();

    let task = tokio::spawn(run_delivery(
        rx,
        channel,
        spacing,
        depth.clone(),
        drain.clone(),
    ));

    let sink = NotificationSink {
        tx,
        depth: depth.clone(),
    };
    (sink, DeliveryWorker { task, drain, depth })
}

async fn run_delivery(
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
    channel: Arc<dyn NotificationChannel>,
    spacing: Duration,
    depth: Arc<AtomicUsize>,
    drain: CancellationToken,
) {
    loop {
        // Once draining, take what is already queued and stop when empty.
        let next = tokio::select! {
            biased;
            message = rx.recv() => message,
            _ = drain.cancelled() => rx.try_recv().ok(),
        };
        let Some(message) = next else {
            break;
        };

        match channel.send(&message.text).await {
            Ok(()) => debug!(
                channel = channel.channel_type(),
                waited_ms = message.enqueued_at.elapsed().as_millis() as u64,
                "Notification delivered"
            ),
            Err(e) => warn!(
                channel = channel.channel_type(),
                error = %e,
                "Notification delivery failed, dropping message"
            ),
        }
        depth.fetch_sub(1, Ordering::SeqCst);

        tokio::time::sleep(spacing).await;
    }
    debug!("Delivery worker stopped");
}

impl DeliveryWorker {
    /// Deliver what is still queued for at most `grace`, then drop the rest.
    pub async fn shutdown(self, grace: Duration) {
        self.drain.cancel();
        let abort = self.task.abort_handle();

        match tokio::time::timeout(grace, self.task).await {
            Ok(_) => info!("Notification queue drained"),
            Err(_) => {
                abort.abort();
                warn!(
                    dropped = self.depth.load(Ordering::SeqCst),
                    "Notification queue not drained in time, dropping remaining messages"
                );
            }
        }
    }
}
