use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tokio::sync::{oneshot, Mutex};

use crate::error::ServerError;
use crate::router::AppState;
use crate::transport::common::strip_ie_data_prefix;
use crate::transport::TransportHandler;
use sio_protocol::Packet;

/// Each poll is one HTTP request; the handler exists only for the
/// lifetime of that request and delivers its one batch of packets through
/// a oneshot channel back to the handler future awaiting it.
struct XhrPollHandler {
    tx: Mutex<Option<oneshot::Sender<Vec<String>>>>,
}

#[async_trait]
impl TransportHandler for XhrPollHandler {
    fn name(&self) -> &'static str {
        "xhr-polling"
    }

    async fn send_messages(&self, packets: Vec<String>) -> bool {
        match self.tx.lock().await.take() {
            Some(tx) => tx.send(packets).is_ok(),
            None => false,
        }
    }

    async fn session_closed(&self) {}
}

/// `GET /{ns}/1/xhr-polling/{sid}`: attaches, flushes immediately if the
/// queue is non-empty, otherwise waits up to `xhr_polling_timeout` before
/// emitting a single bare Noop.
pub async fn xhr_poll_get(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Response, ServerError> {
    let session = state
        .sessions
        .get(&sid)
        .await
        .ok_or_else(|| ServerError::UnknownSession(sid.clone()))?;
    if session.is_closed().await {
        return Err(ServerError::SessionClosed(sid));
    }

    let (tx, rx) = oneshot::channel();
    let handler: Arc<dyn TransportHandler> = Arc::new(XhrPollHandler { tx: Mutex::new(Some(tx)) });
    session.attach(Arc::clone(&handler)).await?;

    let body = match tokio::time::timeout(state.settings.xhr_polling_timeout, rx).await {
        Ok(Ok(packets)) => sio_protocol::encode_frames(&packets),
        Ok(Err(_)) => String::new(),
        Err(_) => sio_protocol::encode(&Packet::Noop),
    };

    session.detach(&handler).await;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=UTF-8")], body).into_response())
}

/// `POST /{ns}/1/xhr-polling/{sid}`: client-to-server traffic. Body may be
/// prefixed with `data=` (IE XDomainRequest quirk).
pub async fn xhr_poll_post(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    body: String,
) -> Result<Response, ServerError> {
    let session = state
        .sessions
        .get(&sid)
        .await
        .ok_or_else(|| ServerError::UnknownSession(sid.clone()))?;

    let payload = strip_ie_data_prefix(&body);
    let packets = sio_protocol::decode_frames(payload)?;

    for packet in &packets {
        state.stats.lock().await.packets_received(1);
        if session.raw_message(packet).await.is_err() {
            session.close(None).await;
            break;
        }
    }

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=UTF-8")], "").into_response())
}
