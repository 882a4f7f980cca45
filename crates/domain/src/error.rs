use std::time::Duration;

/// Shared error type used across all relay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("unrecognized message kind: {0}")]
    UnrecognizedMessageKind(String),

    #[error("no pending request with id {0}")]
    CorrelationMiss(u64),

    #[error("request id {0} is already pending")]
    DuplicateId(u64),

    #[error("request {id} timed out after {}s", after.as_secs())]
    RequestTimeout { id: u64, after: Duration },

    #[error("streamer disconnected")]
    StreamerDisconnected,

    #[error("no streamer connected")]
    StreamerUnavailable,

    #[error("protocol: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, Error>;
