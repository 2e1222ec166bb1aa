mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Behavior, FakeFactory, RecordingChannel};
use mention_watch::notification::{NotificationSink, notification_queue};
use mention_watch::watcher::{SourceKey, Supervisor, SupervisorConfig};
use tokio::time::Instant;

fn config() -> SupervisorConfig {
    SupervisorConfig {
        restart_delay: Duration::from_secs(5),
        shutdown_timeout: Duration::from_secs(2),
    }
}

fn start(
    sources: Vec<SourceKey>,
    factory: Arc<FakeFactory>,
) -> (Supervisor, Arc<RecordingChannel>, NotificationSink) {
    let channel = Arc::new(RecordingChannel::default());
    let (sink, _worker) = notification_queue(channel.clone(), Duration::from_millis(100));
    let supervisor = Supervisor::start(sources, config(), factory, sink.clone());
    (supervisor, channel, sink)
}

#[tokio::test(start_paused = true)]
async fn test_failed_source_is_replaced_once_and_others_untouched() {
    let a = SourceKey::twitch("a");
    let b = SourceKey::youtube("@b");
    let factory = FakeFactory::new().script(&a, vec![Behavior::Fail, Behavior::Idle]);
    let (supervisor, _, _) = start(vec![a.clone(), b.clone()], factory.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(factory.created(&a), 1);
    let status = supervisor.status().await.unwrap();
    assert_eq!((status.active, status.restarting), (1, 1));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(factory.created(&a), 2);
    assert_eq!(factory.created(&b), 1);

    let status = supervisor.status().await.unwrap();
    assert_eq!(status.active, 2);
    assert_eq!(status.restarting, 0);
    assert_eq!(status.total_restarts, 1);

    supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_event_and_exit_converge_on_one_restart() {
    let a = SourceKey::twitch("a");
    let factory = FakeFactory::new().script(&a, vec![Behavior::Fail, Behavior::Idle]);
    let (supervisor, _, _) = start(vec![a.clone()], factory.clone());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(factory.created(&a), 2);
    assert_eq!(supervisor.status().await.unwrap().total_restarts, 1);

    supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_lingering_failed_monitor_is_aborted_on_restart() {
    let a = SourceKey::twitch("a");
    let factory = FakeFactory::new().script(&a, vec![Behavior::FailAndLinger, Behavior::Idle]);
    let (supervisor, _, _) = start(vec![a.clone()], factory.clone());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(factory.created(&a), 2);
    let status = supervisor.status().await.unwrap();
    assert_eq!((status.active, status.restarting), (1, 0));

    supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_exit_is_restarted() {
    let a = SourceKey::twitch("a");
    let factory = FakeFactory::new().script(&a, vec![Behavior::Exit, Behavior::Idle]);
    let (supervisor, _, _) = start(vec![a.clone()], factory.clone());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(factory.created(&a), 2);

    supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_panicking_monitor_is_isolated() {
    let a = SourceKey::twitch("a");
    let b = SourceKey::twitch("b");
    let factory = FakeFactory::new().script(&a, vec![Behavior::Panic, Behavior::Idle]);
    let (supervisor, _, _) = start(vec![a.clone(), b.clone()], factory.clone());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(factory.created(&a), 2);
    assert_eq!(factory.created(&b), 1);
    assert_eq!(supervisor.status().await.unwrap().active, 2);

    supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_each_mention_is_enqueued_once() {
    let a = SourceKey::twitch("streamer");
    let factory = FakeFactory::new().script(
        &a,
        vec![Behavior::Mention {
            author: "alice".to_string(),
            text: "hey @bob check this".to_string(),
        }],
    );
    let (supervisor, channel, sink) = start(vec![a.clone()], factory);

    tokio::time::sleep(Duration::from_secs(1)).await;
    supervisor.stop().await;
    while sink.queue_depth() > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(
        channel.sent(),
        vec!["📺 [Twitch/streamer] alice: hey @bob check this".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_mention_from_restarted_monitor_is_delivered() {
    let a = SourceKey::youtube("@chan");
    let mention = Behavior::Mention {
        author: "carol".to_string(),
        text: "BOB!".to_string(),
    };
    let factory = FakeFactory::new().script(&a, vec![Behavior::Fail, mention]);
    let (supervisor, channel, _) = start(vec![a.clone()], factory);

    tokio::time::sleep(Duration::from_secs(7)).await;
    supervisor.stop().await;

    assert_eq!(channel.sent(), vec!["📺 [YouTube/@chan] carol: BOB!".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_bounded_and_silences_stragglers() {
    let sources: Vec<_> = (0..20).map(|i| SourceKey::twitch(format!("s{}", i))).collect();
    let factory = FakeFactory::new();
    for source in &sources {
        factory.script(source, vec![Behavior::Stubborn]);
    }
    let (supervisor, channel, sink) = start(sources, factory);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let started = Instant::now();
    supervisor.stop().await;
    assert!(started.elapsed() <= Duration::from_secs(2) + Duration::from_millis(100));

    while sink.queue_depth() > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let delivered = channel.sent().len();
    assert!(delivered > 0);

    // Stubborn monitors emit every 50 ms; none of that may reach the sink now.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.queue_depth(), 0);
    assert_eq!(channel.sent().len(), delivered);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_failures_get_one_replacement_each() {
    let a = SourceKey::twitch("a");
    let b = SourceKey::twitch("b");
    let factory = FakeFactory::new().script(
        &a,
        vec![Behavior::Fail, Behavior::Fail, Behavior::Fail, Behavior::Idle],
    );
    let (supervisor, _, _) = start(vec![a.clone(), b.clone()], factory.clone());

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(factory.created(&a), 4);
    assert_eq!(factory.created(&b), 1);

    let status = supervisor.status().await.unwrap();
    assert_eq!(status.total_restarts, 3);
    assert_eq!((status.active, status.restarting), (2, 0));

    // The last run stays up, so no further replacements happen.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(factory.created(&a), 4);

    supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_restart() {
    let a = SourceKey::twitch("a");
    let factory = FakeFactory::new().script(&a, vec![Behavior::Fail, Behavior::Idle]);
    let (supervisor, _, _) = start(vec![a.clone()], factory.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    supervisor.stop().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(factory.created(&a), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_sources_get_one_monitor() {
    let a = SourceKey::twitch("a");
    let factory = FakeFactory::new();
    let (supervisor, _, _) = start(vec![a.clone(), a.clone()], factory.clone());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(factory.created(&a), 1);
    assert_eq!(supervisor.status().await.unwrap().active, 1);

    supervisor.stop().await;
}
