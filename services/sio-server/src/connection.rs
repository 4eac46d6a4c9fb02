use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::connection_info::ConnectionInfo;
use crate::session::Session;
use sio_protocol::EventArgs;

/// The payload shape delivered to `on_message`: plain text (kind 3) or a
/// parsed JSON value (kind 4).
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Text(String),
    Json(Value),
}

/// A callback registered with an outbound ack, invoked at most once when
/// the matching `Ack` packet arrives (or dropped, never invoked, if it
/// never does). Mirrors `(time, callback, original_message)` in §4.8.
pub type AckCallback = Box<dyn FnOnce(Value, Option<Value>) + Send + Sync>;

/// The application-facing contract the core invokes. Implementors are the
/// per-endpoint handlers applications write; the core holds them behind
/// `Box<dyn Connection>` and calls them through a [`ConnectionContext`]
/// that carries the session/endpoint identity a plain `&self` method can't.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Returning `false` aborts the session/endpoint with a 401.
    async fn on_open(&self, _ctx: &ConnectionContext, _info: &ConnectionInfo) -> bool {
        true
    }

    async fn on_message(&self, ctx: &ConnectionContext, message: InboundMessage);

    async fn on_event(
        &self,
        _ctx: &ConnectionContext,
        _name: &str,
        _args: EventArgs,
    ) -> Option<Value> {
        None
    }

    async fn on_close(&self, _ctx: &ConnectionContext) {}

    /// Endpoint factory: given a sub-endpoint path, returns a fresh
    /// connection instance for it, or `None` if the path isn't recognized.
    /// Only ever called on the default (empty-endpoint) connection.
    fn get_endpoint(&self, _path: &str) -> Option<Box<dyn Connection>> {
        None
    }
}

/// Handed to `Connection` methods so application code can call back into
/// the core: `send`/`emit`/`emit_ack`/`close`, scoped to one endpoint of
/// one session.
pub struct ConnectionContext {
    pub(crate) session: Arc<Session>,
    pub(crate) endpoint: Option<String>,
}

impl ConnectionContext {
    pub fn new(session: Arc<Session>, endpoint: Option<String>) -> Self {
        Self { session, endpoint }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// `send(message, ack_callback, force_json)`.
    pub async fn send(&self, message: Value, ack_callback: Option<AckCallback>, force_json: bool) {
        self.session
            .send_to_endpoint(self.endpoint.clone(), message, ack_callback, force_json)
            .await;
    }

    /// `emit(name, *args)`.
    pub async fn emit(&self, name: &str, args: Vec<Value>) {
        self.session
            .emit_to_endpoint(self.endpoint.clone(), name, EventArgs::Positional(args), None)
            .await;
    }

    /// `emit_ack(callback, name, *args)`.
    pub async fn emit_ack(&self, callback: AckCallback, name: &str, args: Vec<Value>) {
        self.session
            .emit_to_endpoint(
                self.endpoint.clone(),
                name,
                EventArgs::Positional(args),
                Some(callback),
            )
            .await;
    }

    /// Closes this endpoint (or the whole session, if this is the default
    /// connection).
    pub async fn close(&self) {
        self.session.close(self.endpoint.clone()).await;
    }
}
