//! Watcher supervisor.
//!
//! A single actor task owns every monitor handle. Monitors run in a
//! [`JoinSet`] behind `catch_unwind`, so a panicking monitor is observed as an
//! abnormal exit of that one task. Restart timers live in a second `JoinSet`
//! owned by the same actor, which makes cancelling them on stop trivial.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, Id, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{EmittedEvent, EventEmitter, MonitorEvent, PlatformKind, SourceKey};
use super::monitor::MonitorFactory;
use crate::config::Config;
use crate::notification::NotificationSink;

/// Supervisor timing.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Flat delay between a failure and the replacement monitor.
    pub restart_delay: Duration,
    /// Bound on waiting for monitors during [`Supervisor::stop`].
    pub shutdown_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for SupervisorConfig {
    fn from(config: &Config) -> Self {
        Self {
            restart_delay: config.restart_delay,
            shutdown_timeout: config.shutdown_timeout,
        }
    }
}

/// Snapshot of the supervised monitors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStatus {
    /// Monitors currently running.
    pub active: usize,
    /// Monitors waiting for their restart timer.
    pub restarting: usize,
    /// Replacements spawned since start.
    pub total_restarts: u64,
}

/// Format the notification text for a mention.
pub fn format_mention(source: &SourceKey, author: &str, text: &str) -> String {
    format!(
        "📺 [{}/{}] {}: {}",
        source.platform.label(),
        source.channel,
        author,
        text
    )
}

enum Command {
    Status(oneshot::Sender<SupervisorStatus>),
    Stop(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorState {
    Active,
    Restarting,
}

/// How a monitor task ended.
#[derive(Debug)]
enum MonitorExit {
    Returned,
    Panicked(String),
}

/// Supervisor-owned record of one source.
struct MonitorHandle {
    platform: PlatformKind,
    generation: u64,
    state: MonitorState,
    cancel: CancellationToken,
    task: AbortHandle,
    restart_timer: Option<AbortHandle>,
    last_restart_at: Option<Instant>,
    consecutive_failures: u32,
}

/// Handle to the running supervisor.
pub struct Supervisor {
    commands: mpsc::Sender<Command>,
    task: tokio::task::JoinHandle<()>,
}

impl Supervisor {
    /// Spawn one monitor per source and start supervising them.
    ///
    /// Does not wait for any monitor to connect.
    pub fn start(
        sources: Vec<SourceKey>,
        config: SupervisorConfig,
        factory: Arc<dyn MonitorFactory>,
        sink: NotificationSink,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut actor = SupervisorActor {
            config,
            factory,
            sink,
            monitors: HashMap::new(),
            tasks: JoinSet::new(),
            task_sources: HashMap::new(),
            restart_timers: JoinSet::new(),
            events_tx,
            root: CancellationToken::new(),
            total_restarts: 0,
        };

        for source in sources {
            if actor.monitors.contains_key(&source) {
                warn!(source = %source, "Source listed twice, watching it once");
                continue;
            }
            actor.spawn_monitor(source, 0, 0, None);
        }
        info!(monitors = actor.monitors.len(), "Supervisor started");

        let task = tokio::spawn(actor.run(command_rx, events_rx));
        Self { commands, task }
    }

    /// Current monitor counts, or `None` if the supervisor is gone.
    pub async fn status(&self) -> Option<SupervisorStatus> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::Status(tx)).await.ok()?;
        rx.await.ok()
    }

    /// Stop every monitor and cancel pending restarts.
    ///
    /// Monitors get one shared timeout to finish; stragglers are aborted. No
    /// event is dispatched once this returns.
    pub async fn stop(self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Stop(tx)).await.is_ok() {
            let _ = rx.await;
        }
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            error!("Supervisor task panicked: {}", e);
        }
    }
}

struct SupervisorActor {
    config: SupervisorConfig,
    factory: Arc<dyn MonitorFactory>,
    sink: NotificationSink,
    monitors: HashMap<SourceKey, MonitorHandle>,
    tasks: JoinSet<(SourceKey, u64, MonitorExit)>,
    task_sources: HashMap<Id, (SourceKey, u64)>,
    restart_timers: JoinSet<(SourceKey, u64)>,
    events_tx: mpsc::UnboundedSender<EmittedEvent>,
    root: CancellationToken,
    total_restarts: u64,
}

impl SupervisorActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<EmittedEvent>,
    ) {
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(Command::Stop(ack)) => {
                        self.shutdown().await;
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },

                Some(emitted) = events.recv() => self.handle_monitor_event(emitted),

                Some(joined) = self.tasks.join_next_with_id() => self.on_task_exit(joined),

                Some(fired) = self.restart_timers.join_next() => {
                    if let Ok((source, generation)) = fired {
                        self.on_restart_due(source, generation);
                    }
                }
            }
        }
    }

    fn status(&self) -> SupervisorStatus {
        let restarting = self
            .monitors
            .values()
            .filter(|h| h.state == MonitorState::Restarting)
            .count();
        SupervisorStatus {
            active: self.monitors.len() - restarting,
            restarting,
            total_restarts: self.total_restarts,
        }
    }

    fn spawn_monitor(
        &mut self,
        source: SourceKey,
        generation: u64,
        consecutive_failures: u32,
        last_restart_at: Option<Instant>,
    ) {
        let cancel = self.root.child_token();
        let emitter = EventEmitter::new(source.clone(), generation, self.events_tx.clone());
        let monitor = self.factory.create(&source);
        let run = monitor.run(emitter, cancel.clone());

        let key = source.clone();
        let task = self.tasks.spawn(async move {
            let exit = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(()) => MonitorExit::Returned,
                Err(payload) => MonitorExit::Panicked(panic_message(payload.as_ref())),
            };
            (key, generation, exit)
        });
        self.task_sources
            .insert(task.id(), (source.clone(), generation));

        debug!(source = %source, generation, "Monitor spawned");
        self.monitors.insert(
            source.clone(),
            MonitorHandle {
                platform: source.platform,
                generation,
                state: MonitorState::Active,
                cancel,
                task,
                restart_timer: None,
                last_restart_at,
                consecutive_failures,
            },
        );
    }

    fn handle_monitor_event(&mut self, emitted: EmittedEvent) {
        let EmittedEvent { generation, event } = emitted;
        let source = event.source().clone();
        let Some(handle) = self.monitors.get_mut(&source) else {
            return;
        };
        if handle.generation != generation {
            debug!(source = %source, generation, "Dropping event from replaced monitor");
            return;
        }

        let platform = handle.platform.as_str();
        match event {
            MonitorEvent::Connected { .. } => {
                handle.consecutive_failures = 0;
                info!(kind = "connected", platform, source = %source.channel, "Connected");
            }
            MonitorEvent::Reconnecting { .. } => {
                warn!(kind = "reconnecting", platform, source = %source.channel, "Reconnecting");
            }
            MonitorEvent::Info { text, .. } => {
                info!(kind = "info", platform, source = %source.channel, "{}", text);
            }
            MonitorEvent::Mention {
                author,
                text,
                timestamp_ms,
                ..
            } => {
                info!(
                    kind = "mention",
                    platform,
                    source = %source.channel,
                    author = %author,
                    timestamp_ms,
                    "Mention: {}",
                    text
                );
                self.sink.enqueue(format_mention(&source, &author, &text));
            }
            MonitorEvent::Failed { error, .. } => {
                error!(
                    kind = "error",
                    platform,
                    source = %source.channel,
                    "Monitor failed: {}",
                    error
                );
                self.begin_restart(&source, generation);
            }
        }
    }

    fn on_task_exit(&mut self, joined: Result<(Id, (SourceKey, u64, MonitorExit)), JoinError>) {
        let (id, exit) = match joined {
            Ok((id, (_, _, exit))) => (id, exit),
            // Aborted by us: the handle was already replaced or we are stopping.
            Err(e) if e.is_cancelled() => {
                self.task_sources.remove(&e.id());
                return;
            }
            Err(e) => (e.id(), MonitorExit::Panicked(e.to_string())),
        };
        let Some((source, generation)) = self.task_sources.remove(&id) else {
            return;
        };

        let Some(handle) = self.monitors.get(&source) else {
            return;
        };
        if handle.generation != generation || handle.state == MonitorState::Restarting {
            return;
        }

        match exit {
            MonitorExit::Returned => {
                warn!(source = %source, generation, "Monitor exited unexpectedly");
            }
            MonitorExit::Panicked(message) => {
                error!(source = %source, generation, "Monitor panicked: {}", message);
            }
        }
        self.begin_restart(&source, generation);
    }

    /// Common path for explicit failures and unexpected exits.
    fn begin_restart(&mut self, source: &SourceKey, generation: u64) {
        let delay = self.config.restart_delay;
        let Some(handle) = self.monitors.get_mut(source) else {
            return;
        };
        if handle.generation != generation || handle.state == MonitorState::Restarting {
            return;
        }

        handle.state = MonitorState::Restarting;
        handle.consecutive_failures += 1;
        handle.cancel.cancel();

        let key = source.clone();
        let timer = self.restart_timers.spawn(async move {
            tokio::time::sleep(delay).await;
            (key, generation)
        });
        handle.restart_timer = Some(timer);

        warn!(
            source = %source,
            failures = handle.consecutive_failures,
            delay_secs = delay.as_secs_f64(),
            "Scheduling monitor restart"
        );
    }

    fn on_restart_due(&mut self, source: SourceKey, generation: u64) {
        let Some(handle) = self.monitors.get(&source) else {
            return;
        };
        if handle.generation != generation || handle.state != MonitorState::Restarting {
            return;
        }

        // Never run two generations side by side.
        handle.task.abort();
        let failures = handle.consecutive_failures;
        if let Some(previous) = handle.last_restart_at {
            debug!(source = %source, since_last_restart = ?previous.elapsed(), "Replacing monitor");
        }

        self.total_restarts += 1;
        info!(source = %source, attempt = failures, "Restarting monitor");
        self.spawn_monitor(source, generation + 1, failures, Some(Instant::now()));
    }

    async fn shutdown(&mut self) {
        info!(monitors = self.monitors.len(), "Stopping all monitors");

        self.restart_timers.abort_all();
        for handle in self.monitors.values_mut() {
            if let Some(timer) = handle.restart_timer.take() {
                timer.abort();
            }
        }
        self.root.cancel();

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = self.tasks.len(),
                "Monitors did not stop in time, aborting"
            );
            self.tasks.abort_all();
            self.tasks.detach_all();
        }

        self.monitors.clear();
        self.task_sources.clear();
        info!("All monitors stopped");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mention() {
        assert_eq!(
            format_mention(&SourceKey::twitch("shroud"), "alice", "hey @bob"),
            "📺 [Twitch/shroud] alice: hey @bob"
        );
        assert_eq!(
            format_mention(&SourceKey::youtube("@lofi"), "carol", "bob?"),
            "📺 [YouTube/@lofi] carol: bob?"
        );
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_config_from_app_config() {
        let config = SupervisorConfig::default();
        assert_eq!(config.restart_delay, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }
}
