//! `rr-streamer-sdk`: the streamer side of the remote control protocol.
//!
//! A streamer connects to the relay, proves it knows the shared password,
//! and then answers the `request`s the relay forwards from its clients.
//!
//! ```rust,no_run
//! # use rr_streamer_sdk::{RequestContext, RequestHandler, HandlerResult, StreamerClientBuilder};
//! # use tokio_util::sync::CancellationToken;
//! struct Settings;
//!
//! #[async_trait::async_trait]
//! impl RequestHandler for Settings {
//!     async fn handle(&self, _ctx: RequestContext, _data: serde_json::Value) -> HandlerResult {
//!         Ok(serde_json::json!({ "getSettings": { "data": { "scenes": [] } } }))
//!     }
//! }
//!
//! # async fn run() -> Result<(), rr_streamer_sdk::StreamerSdkError> {
//! let client = StreamerClientBuilder::new()
//!     .relay_ws_url("ws://localhost:2345/")
//!     .password("secret")
//!     .build()?;
//! client.run(Settings, CancellationToken::new()).await
//! # }
//! ```
//!
//! # Connection flow
//!
//! 1. Connect WS, wait for `hello { apiVersion, authentication }`
//! 2. Send `identify` with the challenge-response digest
//! 3. Expect `identified` within the identify timeout
//! 4. Main loop: each `request` is handed to the [`RequestHandler`] and
//!    always answered with a `response`; queued log entries go out as
//!    `event { log }`
//! 5. On disconnect: reconnect with jittered exponential back-off

pub mod builder;
pub mod client;
pub mod reconnect;
pub mod types;

pub use builder::StreamerClientBuilder;
pub use client::{LogSender, StreamerClient};
pub use reconnect::ReconnectBackoff;
pub use types::{HandlerError, HandlerResult, RequestContext, RequestHandler, StreamerSdkError};

pub use rr_protocol::{RelayMessage, RequestResult, StreamerMessage};
