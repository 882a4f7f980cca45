//! Core types for request handling: context, results, and errors.

use tokio_util::sync::CancellationToken;

/// Context provided to every handler invocation.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Correlation id; the SDK echoes it in the `response`.
    pub request_id: u64,
    /// Cancelled when the relay connection drops or the client shuts down.
    pub cancel: CancellationToken,
}

/// Result type for request handlers. The `Ok` value becomes `response.data`.
pub type HandlerResult = Result<serde_json::Value, HandlerError>;

/// Errors a handler can return. Both are answered with
/// `result: unknownRequest` and no data.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HandlerError {
    #[error("unknown request: {0}")]
    UnknownRequest(String),
    #[error("failed: {0}")]
    Failed(String),
}

/// Implement this to answer the requests the relay forwards.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: RequestContext, data: serde_json::Value) -> HandlerResult;
}

/// Top-level SDK error.
#[derive(thiserror::Error, Debug)]
pub enum StreamerSdkError {
    #[error("config: {0}")]
    Config(String),
    #[error("handshake: {0}")]
    Handshake(String),
    #[error("relay did not accept our password")]
    NotIdentified,
    #[error("reconnect exhausted after {0} attempts")]
    ReconnectExhausted(u32),
    #[error("shutdown")]
    Shutdown,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
