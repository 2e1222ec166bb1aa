#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mention_watch::Result;
use mention_watch::notification::NotificationChannel;
use mention_watch::watcher::{ChannelMonitor, EventEmitter, MonitorFactory, SourceKey};
use tokio_util::sync::CancellationToken;

/// What a fake monitor does on a given run.
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Emit `Connected` and wait for cancellation.
    Idle,
    /// Emit `Failed` and return.
    Fail,
    /// Emit `Failed` but keep running until cancelled.
    FailAndLinger,
    /// Return without emitting anything.
    Exit,
    Panic,
    /// Emit the given mention, then wait for cancellation.
    Mention { author: String, text: String },
    /// Ignore cancellation and keep emitting mentions.
    Stubborn,
}

/// Factory handing out scripted monitors; the last behavior repeats.
#[derive(Default)]
pub struct FakeFactory {
    scripts: Mutex<HashMap<SourceKey, Vec<Behavior>>>,
    created: Mutex<HashMap<SourceKey, usize>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, source: &SourceKey, behaviors: Vec<Behavior>) -> Arc<Self> {
        self.scripts
            .lock()
            .unwrap()
            .insert(source.clone(), behaviors);
        self.clone()
    }

    pub fn created(&self, source: &SourceKey) -> usize {
        self.created.lock().unwrap().get(source).copied().unwrap_or(0)
    }
}

impl MonitorFactory for FakeFactory {
    fn create(&self, source: &SourceKey) -> Box<dyn ChannelMonitor> {
        let run = {
            let mut created = self.created.lock().unwrap();
            let count = created.entry(source.clone()).or_insert(0);
            *count += 1;
            *count - 1
        };
        let behavior = self
            .scripts
            .lock()
            .unwrap()
            .get(source)
            .and_then(|script| script.get(run).or_else(|| script.last()).cloned())
            .unwrap_or(Behavior::Idle);
        Box::new(FakeMonitor { behavior })
    }
}

struct FakeMonitor {
    behavior: Behavior,
}

#[async_trait]
impl ChannelMonitor for FakeMonitor {
    async fn run(self: Box<Self>, emitter: EventEmitter, cancel: CancellationToken) {
        match self.behavior {
            Behavior::Idle => {
                emitter.connected();
                cancel.cancelled().await;
            }
            Behavior::Fail => {
                emitter.failed("scripted failure");
            }
            Behavior::FailAndLinger => {
                emitter.failed("scripted failure");
                cancel.cancelled().await;
            }
            Behavior::Exit => {}
            Behavior::Panic => {
                tokio::task::yield_now().await;
                panic!("scripted panic");
            }
            Behavior::Mention { author, text } => {
                emitter.connected();
                emitter.mention(author, text, 0);
                cancel.cancelled().await;
            }
            Behavior::Stubborn => loop {
                emitter.mention("ghost", "bob", 0);
                tokio::time::sleep(Duration::from_millis(50)).await;
            },
        }
    }
}

/// Channel recording every delivery attempt.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn channel_type(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
