//! Transport handlers: five adapters sharing one contract (§4.4). A
//! session only ever knows it has "a handler attached"; it never reaches
//! into transport-specific state.

pub mod common;
pub mod htmlfile;
pub mod jsonp_polling;
pub mod websocket;
pub mod xhr_polling;

use async_trait::async_trait;

/// The common handler contract every transport implements. Sessions treat
/// all handlers identically through this trait.
#[async_trait]
pub trait TransportHandler: Send + Sync {
    /// Stable identifier, e.g. `"websocket"`, `"xhr-polling"`.
    fn name(&self) -> &'static str;

    /// Delivers an entire batch of already-encoded packets to the client
    /// in one logical response or frame. Returns `false` on I/O failure,
    /// which the session treats as an implicit detach.
    async fn send_messages(&self, packets: Vec<String>) -> bool;

    /// The session asks the handler to tear itself down because the
    /// session has closed.
    async fn session_closed(&self);

    /// Client IP this handler is bound to, when known. Used for the
    /// hijack defense in `Session::attach`.
    fn remote_addr(&self) -> Option<String> {
        None
    }
}
