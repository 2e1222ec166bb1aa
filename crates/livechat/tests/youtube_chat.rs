use std::time::Duration;

use livechat::{
    ChatControlEvent, ChatItem, ChatProvider, ConnectionConfig, ReconnectConfig,
    YouTubeChatProvider, default_client,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIVE_CHAT_PAGE: &str = r#"<script>ytcfg.set({"INNERTUBE_API_KEY":"test-key","INNERTUBE_CLIENT_VERSION":"2.20240101.00.00"});</script>
<script>window["ytInitialData"] = {"continuation":"first"};</script>"#;

fn page(continuation: Option<&str>, texts: &[(&str, &str)]) -> serde_json::Value {
    let actions: Vec<_> = texts
        .iter()
        .map(|(id, text)| {
            json!({
                "addChatItemAction": { "item": { "liveChatTextMessageRenderer": {
                    "id": id,
                    "authorName": { "simpleText": "Viewer" },
                    "message": { "runs": [{ "text": text }] }
                }}}
            })
        })
        .collect();

    let mut contents = json!({ "actions": actions });
    if let Some(token) = continuation {
        contents["continuations"] = json!([{
            "timedContinuationData": { "continuation": token, "timeoutMs": 1000 }
        }]);
    }
    json!({ "continuationContents": { "liveChatContinuation": contents } })
}

async fn next(conn: &mut livechat::ChatConnection) -> Option<ChatItem> {
    tokio::time::timeout(Duration::from_secs(10), conn.next_item())
        .await
        .expect("chat item in time")
}

#[tokio::test]
async fn test_polls_skip_backlog_and_report_end() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/live_chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LIVE_CHAT_PAGE))
        .mount(&server)
        .await;

    let poll = "/youtubei/v1/live_chat/get_live_chat";
    Mock::given(method("POST"))
        .and(path(poll))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(Some("second"), &[("old", "backlog")])),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(poll))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(Some("third"), &[("new", "hello @bob")])),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(poll))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(None, &[])))
        .mount(&server)
        .await;

    let provider = YouTubeChatProvider::new(default_client().unwrap()).with_base_url(server.uri());
    let mut conn = provider
        .connect("abcdefghijk", ConnectionConfig::default())
        .await
        .unwrap();

    assert!(matches!(
        next(&mut conn).await,
        Some(ChatItem::Control(ChatControlEvent::Connected))
    ));
    match next(&mut conn).await {
        Some(ChatItem::Message(msg)) => {
            assert_eq!(msg.id, "new");
            assert_eq!(msg.content, "hello @bob");
        }
        other => panic!("expected the live message, got {:?}", other),
    }
    assert!(matches!(
        next(&mut conn).await,
        Some(ChatItem::Control(ChatControlEvent::StreamClosed { .. }))
    ));
    assert!(next(&mut conn).await.is_none());
}

#[tokio::test]
async fn test_connect_fails_without_chat_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live_chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>chat disabled</html>"))
        .mount(&server)
        .await;

    let provider = YouTubeChatProvider::new(default_client().unwrap()).with_base_url(server.uri());
    let result = provider
        .connect("abcdefghijk", ConnectionConfig::default())
        .await;

    assert!(matches!(result, Err(livechat::ChatError::Protocol(_))));
}

#[tokio::test]
async fn test_gives_up_after_reconnect_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live_chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LIVE_CHAT_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let provider = YouTubeChatProvider::new(default_client().unwrap())
        .with_base_url(server.uri())
        .with_reconnect(ReconnectConfig {
            max_reconnect_attempts: 2,
            base_reconnect_delay_ms: 10,
            max_reconnect_delay_ms: 20,
        });
    let mut conn = provider
        .connect("abcdefghijk", ConnectionConfig::default())
        .await
        .unwrap();

    let mut attempts = Vec::new();
    while let Some(item) = next(&mut conn).await {
        if let ChatItem::Control(ChatControlEvent::Reconnecting { attempt }) = item {
            attempts.push(attempt);
        }
    }
    assert_eq!(attempts, vec![1, 2]);
}
