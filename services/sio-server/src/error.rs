use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures surfaced while routing a request or dispatching a packet.
///
/// [`ServerError::status`] is the single place that maps a failure onto
/// its HTTP response code.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no session with id {0:?}")]
    UnknownSession(String),

    #[error("session {0:?} is already closed")]
    SessionClosed(String),

    #[error("a handler is already attached to session {0:?}")]
    AlreadyAttached(String),

    #[error("handler client ip does not match session remote_ip")]
    HijackMismatch,

    #[error("unsupported protocol version {0:?}")]
    UnsupportedVersion(String),

    #[error("malformed jsonp body")]
    MalformedJsonpBody,

    #[error(transparent)]
    Codec(#[from] sio_protocol::CodecError),
}

impl ServerError {
    pub fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ServerError::UnknownSession(_)
            | ServerError::SessionClosed(_)
            | ServerError::HijackMismatch => StatusCode::UNAUTHORIZED,
            ServerError::AlreadyAttached(_) => StatusCode::UNAUTHORIZED,
            ServerError::UnsupportedVersion(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::MalformedJsonpBody => StatusCode::FORBIDDEN,
            ServerError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, self.to_string()).into_response()
    }
}
