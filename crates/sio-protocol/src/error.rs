use thiserror::Error;

/// Failures that can occur while decoding a packet or a frame payload.
///
/// Callers that hit any of these while processing an inbound request are
/// expected to close the owning session rather than attempt partial
/// recovery — see the dispatch discipline in [`crate::packet::Packet`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("truncated frame: expected {expected} code points, found {found}")]
    TruncatedFrame { expected: usize, found: usize },

    #[error("invalid frame length prefix: {0:?}")]
    InvalidFrameLength(String),

    #[error("invalid packet kind: {0:?}")]
    InvalidKind(String),

    #[error("invalid json payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("event payload missing required field: {0}")]
    MalformedEvent(&'static str),

    #[error("malformed ack payload: {0:?}")]
    MalformedAck(String),
}

pub type CodecResult<T> = Result<T, CodecError>;
