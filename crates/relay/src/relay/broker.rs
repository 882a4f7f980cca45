//! The broker: the single current streamer binding plus the request
//! correlator. Its methods are the only places session state changes.
//!
//! Lock order is always `streamer` → correlator, so a request can never be
//! registered against a binding that is concurrently being replaced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rr_domain::{Error, Result};
use rr_protocol::{auth, RelayMessage};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::challenge::Challenge;
use super::correlator::{Correlator, Reply};

/// Channel feeding the streamer connection's writer task.
///
/// Unbounded so requests can be queued while the broker lock is held: each
/// client has at most one request outstanding, which bounds the queue.
pub type StreamerSink = mpsc::UnboundedSender<RelayMessage>;

struct StreamerBinding {
    connection_id: u64,
    challenge: Challenge,
    sink: StreamerSink,
    authenticated: bool,
    connected_at: DateTime<Utc>,
    displaced: CancellationToken,
}

/// Handle returned to the streamer connection that was just attached.
#[derive(Debug, Clone)]
pub struct StreamerLease {
    pub connection_id: u64,
    /// Cancelled when a newer streamer connection takes over; the holder
    /// must then close its socket.
    pub displaced: CancellationToken,
}

/// Snapshot of the current streamer, for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StreamerStatus {
    pub connection_id: u64,
    pub authenticated: bool,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokerStatus {
    pub streamer: Option<StreamerStatus>,
    pub pending_requests: usize,
}

pub struct Broker {
    password: String,
    api_version: String,
    request_timeout: Option<Duration>,
    next_connection_id: AtomicU64,
    streamer: Mutex<Option<StreamerBinding>>,
    correlator: Correlator,
}

impl Broker {
    pub fn new(
        password: impl Into<String>,
        api_version: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            password: password.into(),
            api_version: api_version.into(),
            request_timeout,
            next_connection_id: AtomicU64::new(1),
            streamer: Mutex::new(None),
            correlator: Correlator::new(),
        }
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    // ── Streamer side ───────────────────────────────────────────────

    /// Install a newly accepted streamer connection as the current one.
    ///
    /// Generates its challenge and queues `hello` on `sink` before the
    /// binding becomes visible, so `hello` is always the first outbound
    /// frame. Requests pending on a displaced streamer are failed with
    /// [`Error::StreamerDisconnected`] and its lease is cancelled.
    pub fn attach_streamer(&self, sink: StreamerSink) -> Result<StreamerLease> {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let challenge = Challenge::generate();

        let hello = RelayMessage::Hello {
            api_version: self.api_version.clone(),
            authentication: challenge.authentication(),
        };
        sink.send(hello)
            .map_err(|_| Error::Protocol("streamer outbound queue unavailable".into()))?;

        let displaced = CancellationToken::new();

        let mut streamer = self.streamer.lock();
        let previous = streamer.replace(StreamerBinding {
            connection_id,
            challenge,
            sink,
            authenticated: false,
            connected_at: Utc::now(),
            displaced: displaced.clone(),
        });

        if let Some(old) = previous {
            old.displaced.cancel();
            let failed = self.correlator.fail_for_connection(old.connection_id);
            tracing::warn!(
                old_connection_id = old.connection_id,
                connection_id,
                failed_in_flight = failed,
                "streamer replaced by a new connection"
            );
        }

        Ok(StreamerLease {
            connection_id,
            displaced,
        })
    }

    /// Forget `connection_id` if it is still the current streamer, and fail
    /// its pending requests. Returns how many requests were failed.
    pub fn detach_streamer(&self, connection_id: u64) -> usize {
        let mut streamer = self.streamer.lock();
        if streamer
            .as_ref()
            .is_some_and(|b| b.connection_id == connection_id)
        {
            *streamer = None;
        }
        self.correlator.fail_for_connection(connection_id)
    }

    /// Check an `identify` digest against the connection's challenge.
    ///
    /// Each attempt is judged on its own; failures are neither counted nor
    /// reported to the streamer.
    pub fn authenticate(&self, connection_id: u64, candidate: &str) -> Result<()> {
        let mut streamer = self.streamer.lock();
        let binding = match streamer.as_mut() {
            Some(b) if b.connection_id == connection_id => b,
            _ => return Err(Error::StreamerDisconnected),
        };

        let ok = auth::verify(
            candidate,
            &self.password,
            &binding.challenge.salt,
            &binding.challenge.challenge,
        );
        if !ok {
            return Err(Error::AuthenticationFailed);
        }
        binding.authenticated = true;
        Ok(())
    }

    /// Route a `response` read on `connection_id` to its waiting client.
    ///
    /// Only the connection a request was forwarded on can answer it. This is
    /// the one place a correlation miss is reported.
    pub fn deliver_response(&self, connection_id: u64, id: u64, reply: Reply) -> bool {
        let delivered = self.correlator.resolve(id, connection_id, reply);
        if !delivered {
            tracing::debug!(
                connection_id,
                error = %Error::CorrelationMiss(id),
                "discarding streamer response"
            );
        }
        delivered
    }

    // ── Client side ─────────────────────────────────────────────────

    /// Forward `data` to the streamer and wait for its answer.
    ///
    /// Ids are allocated and queued under the same lock, so the streamer
    /// sees requests in id order.
    pub async fn request(&self, data: Value) -> Result<Reply> {
        let slot = {
            let streamer = self.streamer.lock();
            let binding = streamer.as_ref().ok_or(Error::StreamerUnavailable)?;
            let id = self.correlator.allocate();
            let slot = self.correlator.register(id, binding.connection_id)?;

            if binding.sink.send(RelayMessage::Request { id, data }).is_err() {
                self.correlator.abandon(id);
                return Err(Error::StreamerDisconnected);
            }
            tracing::debug!(request_id = id, "forwarded request to streamer");
            slot
        };

        self.correlator
            .await_resolution(slot, self.request_timeout)
            .await
    }

    pub fn status(&self) -> BrokerStatus {
        let streamer = self.streamer.lock().as_ref().map(|b| StreamerStatus {
            connection_id: b.connection_id,
            authenticated: b.authenticated,
            connected_at: b.connected_at,
        });
        BrokerStatus {
            streamer,
            pending_requests: self.correlator.pending_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rr_protocol::RequestResult;
    use serde_json::json;
    use std::sync::Arc;

    fn broker() -> Arc<Broker> {
        Arc::new(Broker::new("pw", "0.1", Some(Duration::from_secs(5))))
    }

    fn hello_challenge(msg: RelayMessage) -> (String, String) {
        match msg {
            RelayMessage::Hello { authentication, .. } => {
                (authentication.challenge, authentication.salt)
            }
            other => panic!("expected hello, got {other:?}"),
        }
    }

    fn ok(data: Value) -> Reply {
        Reply {
            result: Some(RequestResult::Ok),
            data,
        }
    }

    #[test]
    fn attach_queues_hello_first() {
        let b = broker();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let lease = b.attach_streamer(tx).unwrap();
        assert_eq!(lease.connection_id, 1);

        let (challenge, salt) = hello_challenge(rx.try_recv().unwrap());
        assert_eq!(challenge.len(), 128);
        assert_eq!(salt.len(), 128);
        assert!(b.status().streamer.is_some());
    }

    #[test]
    fn authenticate_with_correct_digest() {
        let b = broker();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = b.attach_streamer(tx).unwrap().connection_id;
        let (challenge, salt) = hello_challenge(rx.try_recv().unwrap());

        let wrong = auth::expected_digest("nope", &salt, &challenge);
        assert!(matches!(
            b.authenticate(id, &wrong),
            Err(Error::AuthenticationFailed)
        ));
        assert!(!b.status().streamer.unwrap().authenticated);

        let right = auth::expected_digest("pw", &salt, &challenge);
        b.authenticate(id, &right).unwrap();
        assert!(b.status().streamer.unwrap().authenticated);
    }

    #[test]
    fn displaced_connection_cannot_authenticate() {
        let b = broker();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let old = b.attach_streamer(tx1).unwrap().connection_id;
        let (challenge, salt) = hello_challenge(rx1.try_recv().unwrap());

        let (tx2, _rx2) = mpsc::unbounded_channel();
        b.attach_streamer(tx2).unwrap();

        let digest = auth::expected_digest("pw", &salt, &challenge);
        assert!(matches!(
            b.authenticate(old, &digest),
            Err(Error::StreamerDisconnected)
        ));
    }

    #[tokio::test]
    async fn request_without_streamer_is_unavailable() {
        let b = broker();
        let err = b.request(json!({})).await.unwrap_err();
        assert!(matches!(err, Error::StreamerUnavailable));
        assert_eq!(b.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn request_roundtrip() {
        let b = broker();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = b.attach_streamer(tx).unwrap().connection_id;
        rx.recv().await.unwrap(); // hello

        let waiter = {
            let b = b.clone();
            tokio::spawn(async move { b.request(json!({"getSettings": {}})).await })
        };

        let (id, data) = match rx.recv().await.unwrap() {
            RelayMessage::Request { id, data } => (id, data),
            other => panic!("expected request, got {other:?}"),
        };
        assert_eq!(id, 1);
        assert_eq!(data, json!({"getSettings": {}}));

        assert!(b.deliver_response(conn, id, ok(json!({"scenes": ["main"]}))));
        let reply = waiter.await.unwrap().unwrap();
        assert_eq!(reply.data, json!({"scenes": ["main"]}));
        assert_eq!(b.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn replacing_streamer_fails_pending_requests() {
        let b = broker();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let first = b.attach_streamer(tx1).unwrap();
        rx1.recv().await.unwrap();

        let waiter = {
            let b = b.clone();
            tokio::spawn(async move { b.request(json!({"getStatus": {}})).await })
        };
        assert!(matches!(
            rx1.recv().await.unwrap(),
            RelayMessage::Request { .. }
        ));

        assert!(!first.displaced.is_cancelled());
        let (tx2, _rx2) = mpsc::unbounded_channel();
        b.attach_streamer(tx2).unwrap();
        assert!(first.displaced.is_cancelled());

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::StreamerDisconnected));
        assert_eq!(b.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn detach_of_stale_connection_keeps_current_streamer() {
        let b = broker();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let old = b.attach_streamer(tx1).unwrap().connection_id;
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let current = b.attach_streamer(tx2).unwrap().connection_id;

        b.detach_streamer(old);
        assert_eq!(b.status().streamer.unwrap().connection_id, current);

        b.detach_streamer(current);
        assert!(b.status().streamer.is_none());
    }

    #[test]
    fn unmatched_response_is_discarded() {
        let b = broker();
        assert!(!b.deliver_response(1, 99, ok(Value::Null)));
    }

    #[tokio::test]
    async fn displaced_streamer_cannot_answer_current_requests() {
        let b = broker();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let old = b.attach_streamer(tx1).unwrap().connection_id;
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let current = b.attach_streamer(tx2).unwrap().connection_id;
        rx2.recv().await.unwrap(); // hello

        let waiter = {
            let b = b.clone();
            tokio::spawn(async move { b.request(json!({"getSettings": {}})).await })
        };
        let id = match rx2.recv().await.unwrap() {
            RelayMessage::Request { id, .. } => id,
            other => panic!("expected request, got {other:?}"),
        };

        assert!(!b.deliver_response(old, id, ok(json!({"forged": true}))));
        assert_eq!(b.correlator().pending_count(), 1);

        assert!(b.deliver_response(current, id, ok(json!({"real": true}))));
        assert_eq!(waiter.await.unwrap().unwrap().data, json!({"real": true}));
    }

    #[tokio::test]
    async fn requests_reach_streamer_in_id_order() {
        let b = broker();
        let (tx, mut rx) = mpsc::unbounded_channel();
        b.attach_streamer(tx).unwrap();
        rx.recv().await.unwrap(); // hello

        let waiters: Vec<_> = (0..32)
            .map(|n| {
                let b = b.clone();
                tokio::spawn(async move { b.request(json!({ "n": n })).await })
            })
            .collect();

        let mut last = 0;
        for _ in 0..32 {
            match rx.recv().await.unwrap() {
                RelayMessage::Request { id, .. } => {
                    assert!(id > last, "request {id} arrived after {last}");
                    last = id;
                }
                other => panic!("expected request, got {other:?}"),
            }
        }

        for w in waiters {
            w.abort();
        }
    }
}
