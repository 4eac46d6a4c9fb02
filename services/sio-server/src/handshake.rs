use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ServerError;
use crate::router::AppState;
use crate::session::Session;
use crate::transport::common::wrap_jsonp;

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    pub jsonp: Option<String>,
}

/// `GET /{ns}/{version}/`: creates a session and emits its descriptor
/// (§4.5). The peer address is pinned to the session here so later
/// transport attaches can be checked against it (§4.3's hijack defense).
pub async fn handshake_handler(
    State(state): State<AppState>,
    Path(version): Path<String>,
    Query(query): Query<HandshakeQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Response, ServerError> {
    if version != "1" {
        return Err(ServerError::UnsupportedVersion(version));
    }

    let session_id = Uuid::new_v4().to_string();
    let default_connection = (state.connection_factory)();
    let session = Session::new(
        session_id.clone(),
        Some(addr.ip().to_string()),
        default_connection,
        Arc::clone(&state.settings),
        Arc::clone(&state.stats),
    );
    state.sessions.add(Arc::clone(&session)).await;
    state.stats.lock().await.session_opened();

    if state.settings.global_heartbeats {
        session.start_heartbeat().await;
    }

    let transports = state.settings.enabled_protocols.join(",");
    let descriptor = format!(
        "{}:{}:{}:{}",
        session_id,
        state.settings.heartbeat_timeout().as_secs(),
        state.settings.close_timeout().as_secs(),
        transports
    );

    let response = match query.jsonp {
        Some(index) => {
            let json = serde_json::to_string(&descriptor).expect("string always serializes");
            let body = wrap_jsonp(&index, &json);
            ([(header::CONTENT_TYPE, "application/javascript; charset=UTF-8")], body).into_response()
        }
        None => ([(header::CONTENT_TYPE, "text/plain; charset=UTF-8")], descriptor).into_response(),
    };
    Ok(response)
}
