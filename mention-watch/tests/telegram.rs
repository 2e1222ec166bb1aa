use std::sync::Arc;
use std::time::Duration;

use mention_watch::Error;
use mention_watch::notification::{
    NotificationChannel, TelegramChannel, TelegramConfig, notification_queue,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123456:test-token";

fn channel(server: &MockServer) -> TelegramChannel {
    TelegramChannel::new(TelegramConfig {
        bot_token: TOKEN.to_string(),
        chat_id: "-100200".to_string(),
    })
    .unwrap()
    .with_api_base(server.uri())
}

#[tokio::test]
async fn test_send_posts_chat_id_and_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", TOKEN)))
        .and(body_json(json!({
            "chat_id": "-100200",
            "text": "📺 [Twitch/chan] alice: hi bob",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    channel(&server)
        .send("📺 [Twitch/chan] alice: hi bob")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_non_success_status_is_a_delivery_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("chat not found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = channel(&server).send("hello").await.unwrap_err();
    match err {
        Error::Delivery { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "chat not found");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_transport_error_does_not_leak_token() {
    // Bind and release a port so the connection is refused.
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let channel = TelegramChannel::new(TelegramConfig {
        bot_token: TOKEN.to_string(),
        chat_id: "1".to_string(),
    })
    .unwrap()
    .with_api_base(uri);

    let err = channel.send("hello").await.unwrap_err();
    assert!(matches!(err, Error::Http(_)));
    assert!(!err.to_string().contains("test-token"));
    assert!(!format!("{:?}", err).contains("test-token"));
}

#[tokio::test]
async fn test_failing_endpoint_gets_one_attempt_per_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let (sink, worker) = notification_queue(Arc::new(channel(&server)), Duration::from_millis(10));
    for i in 0..4 {
        sink.enqueue(format!("message {}", i));
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        while sink.queue_depth() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    worker.shutdown(Duration::from_secs(1)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}
