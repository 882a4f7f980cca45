//! Builder for [`StreamerClient`].

use std::time::Duration;

use tokio::sync::mpsc;

use crate::client::StreamerClient;
use crate::reconnect::ReconnectBackoff;
use crate::types::StreamerSdkError;

/// Fluent builder for [`StreamerClient`].
pub struct StreamerClientBuilder {
    relay_ws_url: String,
    password: String,
    reconnect_backoff: ReconnectBackoff,
    identify_timeout: Duration,
    max_concurrent_requests: usize,
    max_request_bytes: usize,
}

impl StreamerClientBuilder {
    pub fn new() -> Self {
        Self {
            relay_ws_url: "ws://localhost:2345/".into(),
            password: String::new(),
            reconnect_backoff: ReconnectBackoff::default(),
            identify_timeout: Duration::from_secs(10),
            max_concurrent_requests: 16,
            max_request_bytes: 1024 * 1024,
        }
    }

    /// Relay streamer endpoint, e.g. `ws://relay.local:2345/`.
    pub fn relay_ws_url(mut self, url: impl Into<String>) -> Self {
        self.relay_ws_url = url.into();
        self
    }

    /// Shared password the relay was started with.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.reconnect_backoff = cfg;
        self
    }

    /// How long to wait for `identified` after sending `identify`
    /// (default 10s). The relay stays silent on a wrong password, so this
    /// is how a bad password is detected.
    pub fn identify_timeout(mut self, d: Duration) -> Self {
        self.identify_timeout = d;
        self
    }

    /// Maximum requests handled concurrently (default 16).
    pub fn max_concurrent_requests(mut self, n: usize) -> Self {
        self.max_concurrent_requests = n;
        self
    }

    /// Inbound frames above this size are dropped (default 1 MB).
    pub fn max_request_bytes(mut self, n: usize) -> Self {
        self.max_request_bytes = n;
        self
    }

    pub fn build(self) -> Result<StreamerClient, StreamerSdkError> {
        if self.relay_ws_url.is_empty() {
            return Err(StreamerSdkError::Config("relay_ws_url is required".into()));
        }
        if self.password.is_empty() {
            return Err(StreamerSdkError::Config("password is required".into()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(StreamerSdkError::Config(
                "max_concurrent_requests must be greater than 0".into(),
            ));
        }

        let (log_tx, log_rx) = mpsc::channel(256);
        Ok(StreamerClient {
            relay_ws_url: self.relay_ws_url,
            password: self.password,
            reconnect_backoff: self.reconnect_backoff,
            identify_timeout: self.identify_timeout,
            max_concurrent_requests: self.max_concurrent_requests,
            max_request_bytes: self.max_request_bytes,
            log_tx,
            log_rx: tokio::sync::Mutex::new(log_rx),
        })
    }
}

impl Default for StreamerClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
