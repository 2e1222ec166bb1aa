//! Generic WebSocket chat transport with automatic reconnection.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::Result;
use crate::event::{ChatControlEvent, ChatItem};
use crate::http::install_rustls_provider;
use crate::provider::{ChatConnection, ChatProvider, ConnectionConfig, ReconnectConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the read loop should do after a frame was decoded.
#[derive(Debug, Default)]
pub struct Decoded {
    /// Items to hand to the consumer.
    pub items: Vec<ChatItem>,
    /// The server asked us to reconnect (e.g. Twitch `RECONNECT`).
    pub reconnect: bool,
}

/// Protocol definitions for a specific platform.
#[async_trait]
pub trait ChatProtocol: Send + Sync + 'static {
    /// Platform name (e.g., "twitch")
    fn platform(&self) -> &str;

    /// Get the WebSocket URL for the room
    async fn websocket_url(&self, room_id: &str) -> Result<String>;

    /// Generate handshake messages to send upon connection
    async fn handshake_messages(&self, _room_id: &str) -> Result<Vec<Message>> {
        Ok(vec![])
    }

    /// Generate heartbeat message (if any)
    fn heartbeat_message(&self) -> Option<Message> {
        None
    }

    /// Heartbeat interval (default: 30 seconds)
    fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Decode a WebSocket frame.
    ///
    /// Replies (e.g. PONG) are pushed through `tx` and written by the transport.
    async fn decode_message(
        &self,
        message: &Message,
        room_id: &str,
        tx: &mpsc::Sender<Message>,
    ) -> Result<Decoded>;
}

/// Why a live session ended.
enum SessionEnd {
    Shutdown,
    Lost,
    ConsumerGone,
}

/// A generic WebSocket-based chat provider.
pub struct WebSocketChatProvider<P> {
    protocol: P,
    config: ReconnectConfig,
}

impl<P: ChatProtocol + Clone> WebSocketChatProvider<P> {
    pub fn with_protocol(protocol: P, config: Option<ReconnectConfig>) -> Self {
        Self {
            protocol,
            config: config.unwrap_or_default(),
        }
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }
}

async fn open_session<P: ChatProtocol>(protocol: &P, room_id: &str) -> Result<WsStream> {
    let url = protocol.websocket_url(room_id).await?;
    info!("Connecting to WebSocket: {}", url);

    let (mut ws_stream, _) = connect_async(url.as_str()).await?;
    for msg in protocol.handshake_messages(room_id).await? {
        ws_stream.send(msg).await?;
    }
    Ok(ws_stream)
}

/// Drive one established stream until it breaks or shutdown is requested.
async fn run_session<P: ChatProtocol>(
    protocol: &P,
    room_id: &str,
    mut stream: WsStream,
    item_tx: &mpsc::Sender<ChatItem>,
    shutdown: &CancellationToken,
) -> SessionEnd {
    let (response_tx, mut response_rx) = mpsc::channel::<Message>(100);
    let heartbeat_enabled = protocol.heartbeat_message().is_some();
    let mut heartbeat_timer = tokio::time::interval(protocol.heartbeat_interval());
    heartbeat_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = stream.close(None).await;
                return SessionEnd::Shutdown;
            }

            _ = heartbeat_timer.tick(), if heartbeat_enabled => {
                if let Some(msg) = protocol.heartbeat_message() {
                    if let Err(e) = stream.send(msg).await {
                        error!("Failed to send heartbeat: {}", e);
                        return SessionEnd::Lost;
                    }
                    trace!("Sent heartbeat for {}", room_id);
                }
            }

            Some(msg) = response_rx.recv() => {
                if let Err(e) = stream.send(msg).await {
                    error!("Failed to send response message: {}", e);
                    return SessionEnd::Lost;
                }
            }

            msg_opt = stream.next() => {
                match msg_opt {
                    Some(Ok(msg)) => {
                        match protocol.decode_message(&msg, room_id, &response_tx).await {
                            Ok(decoded) => {
                                for item in decoded.items {
                                    if item_tx.send(item).await.is_err() {
                                        return SessionEnd::ConsumerGone;
                                    }
                                }
                                if decoded.reconnect {
                                    info!("Server requested reconnect for {}", room_id);
                                    let _ = stream.close(None).await;
                                    return SessionEnd::Lost;
                                }
                            }
                            Err(e) => warn!("Failed to decode message: {}", e),
                        }
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        return SessionEnd::Lost;
                    }
                    None => {
                        warn!("WebSocket stream closed");
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }
}

/// Connect/reconnect loop. Ends when shutdown is requested, the consumer
/// dropped the connection, or reconnect attempts are exhausted.
async fn run_transport<P: ChatProtocol>(
    protocol: P,
    room_id: String,
    config: ReconnectConfig,
    item_tx: mpsc::Sender<ChatItem>,
    shutdown: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match open_session(&protocol, &room_id).await {
            Ok(stream) => {
                info!("Connected to WebSocket for room {}", room_id);
                attempt = 0;
                if item_tx
                    .send(ChatItem::Control(ChatControlEvent::Connected))
                    .await
                    .is_err()
                {
                    break;
                }
                match run_session(&protocol, &room_id, stream, &item_tx, &shutdown).await {
                    SessionEnd::Shutdown | SessionEnd::ConsumerGone => break,
                    SessionEnd::Lost => {}
                }
            }
            Err(e) => warn!("Connection failed for {}: {}", room_id, e),
        }

        if attempt >= config.max_reconnect_attempts {
            error!("Max reconnect attempts reached for {}", room_id);
            break;
        }
        attempt += 1;
        if item_tx
            .send(ChatItem::Control(ChatControlEvent::Reconnecting { attempt }))
            .await
            .is_err()
        {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(config.delay_for_attempt(attempt)) => {},
            _ = shutdown.cancelled() => break,
        }
    }
    debug!("WebSocket task for {} stopped", room_id);
}

#[async_trait]
impl<P: ChatProtocol + Clone> ChatProvider for WebSocketChatProvider<P> {
    fn platform(&self) -> &str {
        self.protocol.platform()
    }

    async fn connect(&self, room_id: &str, config: ConnectionConfig) -> Result<ChatConnection> {
        install_rustls_provider();

        let (item_tx, item_rx) = mpsc::channel(256);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_transport(
            self.protocol.clone(),
            room_id.to_string(),
            config.reconnect.unwrap_or(self.config),
            item_tx,
            shutdown.clone(),
        ));

        Ok(ChatConnection::new(
            self.platform().to_string(),
            room_id,
            item_rx,
            shutdown,
            task,
        ))
    }
}
