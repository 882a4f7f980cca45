//! Core streamer client: manages the WebSocket lifecycle, the
//! challenge-response handshake, and request dispatch.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{FutureExt, SinkExt, StreamExt};
use rr_protocol::{auth, codec, Authentication, Decoded, RelayMessage, RequestResult, StreamerMessage};
use tokio::sync::{mpsc, Semaphore};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::reconnect::ReconnectBackoff;
use crate::types::{RequestContext, RequestHandler, StreamerSdkError};

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// A configured streamer client. Create via
/// [`StreamerClientBuilder`](crate::builder::StreamerClientBuilder).
pub struct StreamerClient {
    pub(crate) relay_ws_url: String,
    pub(crate) password: String,
    pub(crate) reconnect_backoff: ReconnectBackoff,
    pub(crate) identify_timeout: Duration,
    pub(crate) max_concurrent_requests: usize,
    pub(crate) max_request_bytes: usize,
    pub(crate) log_tx: mpsc::Sender<String>,
    pub(crate) log_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
}

impl std::fmt::Debug for StreamerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamerClient")
            .field("relay_ws_url", &self.relay_ws_url)
            .field("password", &"<redacted>")
            .field("reconnect_backoff", &self.reconnect_backoff)
            .field("identify_timeout", &self.identify_timeout)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("max_request_bytes", &self.max_request_bytes)
            .finish_non_exhaustive()
    }
}

/// Queues log entries for the relay operator. Entries are sent as
/// `event { log }` on the current connection; they wait in the queue while
/// disconnected.
#[derive(Clone)]
pub struct LogSender(mpsc::Sender<String>);

impl LogSender {
    /// Returns `false` once the client has been dropped.
    pub async fn log(&self, entry: impl Into<String>) -> bool {
        self.0.send(entry.into()).await.is_ok()
    }
}

impl StreamerClient {
    pub fn builder() -> crate::builder::StreamerClientBuilder {
        crate::builder::StreamerClientBuilder::new()
    }

    pub fn log_sender(&self) -> LogSender {
        LogSender(self.log_tx.clone())
    }

    /// Connect, authenticate, and serve requests, reconnecting according
    /// to the [`ReconnectBackoff`] policy.
    ///
    /// Returns on shutdown, on reconnect exhaustion, or when the relay
    /// rejects the password.
    pub async fn run(
        self,
        handler: impl RequestHandler,
        shutdown: CancellationToken,
    ) -> Result<(), StreamerSdkError> {
        let handler: Arc<dyn RequestHandler> = Arc::new(handler);
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return Err(StreamerSdkError::Shutdown);
            }

            let result = tokio::select! {
                r = self.connect_and_run(&handler) => r,
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown requested");
                    return Err(StreamerSdkError::Shutdown);
                }
            };

            match result {
                Ok(identified) => {
                    tracing::info!(identified, "relay connection closed");
                    // Only a completed handshake resets the back-off.
                    if identified {
                        attempt = 0;
                    }
                }
                Err(StreamerSdkError::NotIdentified) => {
                    tracing::error!("relay did not identify us; check the password");
                    return Err(StreamerSdkError::NotIdentified);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "relay connection lost");
                }
            }

            if self.reconnect_backoff.exhausted(attempt) {
                tracing::error!(attempts = attempt, "max reconnect attempts exhausted");
                return Err(StreamerSdkError::ReconnectExhausted(attempt));
            }

            let delay = self.reconnect_backoff.delay_for_attempt(attempt);
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt = attempt + 1,
                "reconnecting"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Err(StreamerSdkError::Shutdown),
            }

            attempt += 1;
        }
    }

    /// Same as [`run`](Self::run), on a spawned task.
    pub fn spawn(
        self,
        handler: impl RequestHandler,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), StreamerSdkError>> {
        tokio::spawn(async move { self.run(handler, shutdown).await })
    }

    /// One connection: connect → hello → identify → message loop.
    ///
    /// Returns `Ok(true)` if `identified` was received before the connection
    /// closed.
    async fn connect_and_run(
        &self,
        handler: &Arc<dyn RequestHandler>,
    ) -> Result<bool, StreamerSdkError> {
        tracing::info!(url = %self.relay_ws_url, "connecting to relay");

        let (ws, _response) = tokio_tungstenite::connect_async(&self.relay_ws_url)
            .await
            .map_err(anyhow::Error::from)?;
        let (mut sink, mut stream) = ws.split();

        // ── Wait for hello ───────────────────────────────────────────
        let hello = tokio::time::timeout(HELLO_TIMEOUT, async {
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Text(text) = msg {
                    if let Some(found) = find_hello(&text) {
                        return Ok(found);
                    }
                }
            }
            Err(StreamerSdkError::Handshake("connection closed before hello".into()))
        })
        .await
        .map_err(|_| StreamerSdkError::Handshake("hello timeout".into()))??;

        let (api_version, authentication) = hello;
        tracing::info!(api_version = %api_version, "relay said hello");
        if api_version != rr_protocol::API_VERSION {
            tracing::warn!(
                relay = %api_version,
                ours = rr_protocol::API_VERSION,
                "relay speaks a different api version"
            );
        }

        // ── Identify ─────────────────────────────────────────────────
        let identify = StreamerMessage::Identify {
            authentication: auth::expected_digest(
                &self.password,
                &authentication.salt,
                &authentication.challenge,
            ),
        };
        let text = codec::encode(&identify).map_err(anyhow::Error::from)?;
        sink.send(Message::Text(text)).await.map_err(anyhow::Error::from)?;

        // ── Message loop ─────────────────────────────────────────────
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<StreamerMessage>(64);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_requests));
        let inflight_cancel = CancellationToken::new();

        let writer_task = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let text = match codec::encode(&msg) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize outbound message");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let mut log_rx = self.log_rx.lock().await;
        let mut identified = false;
        let identify_deadline = tokio::time::sleep(self.identify_timeout);
        tokio::pin!(identify_deadline);

        let outcome = 'conn: loop {
            tokio::select! {
                _ = &mut identify_deadline, if !identified => {
                    break 'conn Err(StreamerSdkError::NotIdentified);
                }
                Some(entry) = log_rx.recv() => {
                    let _ = outbound_tx.send(StreamerMessage::log(entry)).await;
                }
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break 'conn Ok(identified),
                        Some(Ok(_)) => continue,
                    };

                    if text.len() > self.max_request_bytes {
                        tracing::warn!(
                            bytes = text.len(),
                            max = self.max_request_bytes,
                            "relay frame exceeds max_request_bytes, dropping"
                        );
                        continue;
                    }

                    let entries = match codec::decode::<RelayMessage>(&text) {
                        Ok(entries) => entries,
                        Err(e) => {
                            tracing::debug!(error = %e, "failed to parse relay frame");
                            continue;
                        }
                    };

                    for entry in entries {
                        match entry {
                            Decoded::Message(RelayMessage::Identified { result }) => {
                                if !result.is_ok() {
                                    break 'conn Err(StreamerSdkError::NotIdentified);
                                }
                                tracing::info!("identified by relay");
                                identified = true;
                            }
                            Decoded::Message(RelayMessage::Request { id, data }) => {
                                let ctx = RequestContext {
                                    request_id: id,
                                    cancel: inflight_cancel.child_token(),
                                };
                                dispatch(handler.clone(), semaphore.clone(), outbound_tx.clone(), ctx, data);
                            }
                            Decoded::Message(RelayMessage::Hello { .. }) => {
                                tracing::debug!("ignoring repeated hello");
                            }
                            Decoded::Unrecognized(kind) => {
                                tracing::debug!(kind = %kind, "ignoring unknown relay message");
                            }
                        }
                    }
                }
            }
        };

        inflight_cancel.cancel();
        writer_task.abort();
        outcome
    }
}

fn find_hello(text: &str) -> Option<(String, Authentication)> {
    codec::decode::<RelayMessage>(text)
        .ok()?
        .into_iter()
        .find_map(|entry| match entry {
            Decoded::Message(RelayMessage::Hello {
                api_version,
                authentication,
            }) => Some((api_version, authentication)),
            _ => None,
        })
}

/// Run the handler on its own task and always queue a `response`.
fn dispatch(
    handler: Arc<dyn RequestHandler>,
    semaphore: Arc<Semaphore>,
    tx: mpsc::Sender<StreamerMessage>,
    ctx: RequestContext,
    data: serde_json::Value,
) {
    tokio::spawn(async move {
        let _permit = semaphore.acquire().await;
        let id = ctx.request_id;
        let cancel = ctx.cancel.clone();

        // catch_unwind: a panicking handler still produces a response.
        let outcome = tokio::select! {
            r = AssertUnwindSafe(handler.handle(ctx, data)).catch_unwind() => r,
            _ = cancel.cancelled() => return,
        };

        let response = match outcome {
            Ok(Ok(data)) => StreamerMessage::Response {
                id,
                result: Some(RequestResult::Ok),
                data: Some(data),
            },
            Ok(Err(e)) => {
                tracing::debug!(request_id = id, error = %e, "handler rejected request");
                StreamerMessage::Response {
                    id,
                    result: Some(RequestResult::UnknownRequest),
                    data: None,
                }
            }
            Err(_panic) => {
                tracing::error!(request_id = id, "request handler panicked");
                StreamerMessage::Response {
                    id,
                    result: Some(RequestResult::UnknownRequest),
                    data: None,
                }
            }
        };

        let _ = tx.send(response).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_hello_in_frame() {
        let text = r#"{"hello":{"apiVersion":"0.1","authentication":{"challenge":"c","salt":"s"}}}"#;
        let (version, authentication) = find_hello(text).unwrap();
        assert_eq!(version, "0.1");
        assert_eq!(authentication.challenge, "c");
        assert_eq!(authentication.salt, "s");
    }

    #[test]
    fn other_frames_are_not_hello() {
        assert!(find_hello(r#"{"request":{"id":1,"data":{}}}"#).is_none());
        assert!(find_hello("not json").is_none());
    }

    #[test]
    fn log_sender_queues_entries() {
        let client = StreamerClient::builder().password("pw").build().unwrap();
        let logs = client.log_sender();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            assert!(logs.log("first").await);
            let mut rx = client.log_rx.lock().await;
            assert_eq!(rx.recv().await.as_deref(), Some("first"));
        });
    }
}
