use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ServerError;
use crate::router::AppState;
use crate::session::Session;
use crate::transport::TransportHandler;
use sio_protocol::Packet;

/// WebSocket and Flash-socket share this handler; they differ only in URL
/// and name (§4.4.1). The sink half is shared behind a mutex so
/// `send_messages` can be called from any task while a dedicated task owns
/// the stream half and drives the recv loop.
pub struct WebSocketTransportHandler {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    remote_addr: Option<String>,
}

#[async_trait]
impl TransportHandler for WebSocketTransportHandler {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn send_messages(&self, packets: Vec<String>) -> bool {
        let mut sink = self.sink.lock().await;
        for packet in packets {
            if sink.send(Message::Text(packet)).await.is_err() {
                return false;
            }
        }
        true
    }

    async fn session_closed(&self) {
        let _ = self.sink.lock().await.close().await;
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }
}

pub async fn websocket_handler(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let session = state
        .sessions
        .get(&sid)
        .await
        .ok_or_else(|| ServerError::UnknownSession(sid.clone()))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(state, session, socket, addr)))
}

async fn handle_socket(state: AppState, session: Arc<Session>, socket: WebSocket, addr: SocketAddr) {
    let (sink, mut stream) = socket.split();
    let handler: Arc<dyn TransportHandler> = Arc::new(WebSocketTransportHandler {
        sink: Mutex::new(sink),
        remote_addr: Some(addr.ip().to_string()),
    });

    if state.settings.websocket_check {
        // Probe before trusting the socket: send one Heartbeat and wait for
        // any inbound frame within `client_timeout` before attaching,
        // starting heartbeats, or flushing the queue (§4.4.1).
        handler.send_messages(vec![sio_protocol::encode(&Packet::Heartbeat)]).await;

        let probe = tokio::time::timeout(state.settings.client_timeout, stream.next()).await;
        let first = match probe {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(_))) | Ok(None) => return,
            Err(_) => {
                warn!(session_id = %session.id, "websocket liveness probe timed out, dropping");
                return;
            }
        };

        if session.attach(Arc::clone(&handler)).await.is_err() {
            warn!(session_id = %session.id, "websocket attach rejected (already attached or hijack mismatch)");
            return;
        }

        match first {
            Message::Text(text) => {
                if !dispatch_inbound(&state, &session, &text).await {
                    session.detach(&handler).await;
                    return;
                }
            }
            Message::Close(_) => {
                session.detach(&handler).await;
                return;
            }
            _ => {}
        }
    } else if session.attach(Arc::clone(&handler)).await.is_err() {
        warn!(session_id = %session.id, "websocket attach rejected (already attached or hijack mismatch)");
        return;
    }

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if !dispatch_inbound(&state, &session, &text).await {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    session.detach(&handler).await;
}

/// Counts the frame, slides the heartbeat, and dispatches it. Returns
/// `false` (and closes the session) on a structural codec error — any
/// exception closes the session (§4.4.1, §7).
async fn dispatch_inbound(state: &AppState, session: &Arc<Session>, text: &str) -> bool {
    state.stats.lock().await.packets_received(1);
    session.delay_heartbeat().await;
    if session.raw_message(text).await.is_err() {
        session.close(None).await;
        return false;
    }
    true
}
