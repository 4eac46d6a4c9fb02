use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::{oneshot, Mutex};

use crate::error::ServerError;
use crate::router::AppState;
use crate::transport::common::{decode_jsonp_post_body, wrap_jsonp};
use crate::transport::TransportHandler;
use sio_protocol::Packet;

#[derive(Debug, Deserialize)]
pub struct JsonpQuery {
    #[serde(rename = "i")]
    pub index: String,
}

struct JsonpPollHandler {
    tx: Mutex<Option<oneshot::Sender<Vec<String>>>>,
}

#[async_trait]
impl TransportHandler for JsonpPollHandler {
    fn name(&self) -> &'static str {
        "jsonp-polling"
    }

    async fn send_messages(&self, packets: Vec<String>) -> bool {
        match self.tx.lock().await.take() {
            Some(tx) => tx.send(packets).is_ok(),
            None => false,
        }
    }

    async fn session_closed(&self) {}
}

fn jsonp_response(index: &str, body: &str) -> Response {
    let json = serde_json::to_string(body).expect("string always serializes");
    let payload = wrap_jsonp(index, &json);
    let mut response =
        ([(header::CONTENT_TYPE, "text/javascript; charset=UTF-8")], payload).into_response();
    response.headers_mut().insert("x-xss-protection", HeaderValue::from_static("0"));
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("Keep-Alive"));
    response
}

/// Same state machine as xhr-polling's GET; the response is wrapped in
/// the JSONP callback shell instead of being plain text.
pub async fn jsonp_poll_get(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Query(query): Query<JsonpQuery>,
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
    let handler: Arc<dyn TransportHandler> = Arc::new(JsonpPollHandler { tx: Mutex::new(Some(tx)) });
    session.attach(Arc::clone(&handler)).await?;

    let body = match tokio::time::timeout(state.settings.xhr_polling_timeout, rx).await {
        Ok(Ok(packets)) => sio_protocol::encode_frames(&packets),
        Ok(Err(_)) => String::new(),
        Err(_) => sio_protocol::encode(&Packet::Noop),
    };

    session.detach(&handler).await;
    Ok(jsonp_response(&query.index, &body))
}

/// `POST /{ns}/1/jsonp-polling/{sid}`: body is `d=<url-encoded JSON
/// string>` carrying the raw frame payload.
pub async fn jsonp_poll_post(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    body: String,
) -> Result<Response, ServerError> {
    let session = state
        .sessions
        .get(&sid)
        .await
        .ok_or_else(|| ServerError::UnknownSession(sid.clone()))?;

    let payload = decode_jsonp_post_body(&body)?;
    let packets = sio_protocol::decode_frames(&payload)?;

    for packet in &packets {
        state.stats.lock().await.packets_received(1);
        if session.raw_message(packet).await.is_err() {
            session.close(None).await;
            break;
        }
    }

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=UTF-8")], "").into_response())
}
