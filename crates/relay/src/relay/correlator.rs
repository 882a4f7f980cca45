//! Request correlator: allocates request ids and hands each streamer
//! `response` to the client task waiting on that id.
//!
//! Every pending entry remembers the streamer connection its request was
//! forwarded on, so a disconnect fails exactly that connection's requests.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rr_domain::{Error, Result};
use rr_protocol::RequestResult;
use serde_json::Value;
use tokio::sync::oneshot;

/// What the streamer answered for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub result: Option<RequestResult>,
    pub data: Value,
}

struct Pending {
    connection_id: u64,
    tx: oneshot::Sender<Result<Reply>>,
}

/// Receiving half of a registered request. Resolved at most once.
#[derive(Debug)]
pub struct CompletionSlot {
    id: u64,
    rx: oneshot::Receiver<Result<Reply>>,
}

impl CompletionSlot {
    pub fn id(&self) -> u64 {
        self.id
    }
}

pub struct Correlator {
    next_id: AtomicU64,
    /// Map of request id → pending sender + owning streamer connection.
    pending: Mutex<HashMap<u64, Pending>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Next request id: 1, 2, 3, ... Safe to call from many tasks at once.
    pub fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Create the completion slot for `id`, owned by streamer `connection_id`.
    pub fn register(&self, id: u64, connection_id: u64) -> Result<CompletionSlot> {
        let (tx, rx) = oneshot::channel();
        match self.pending.lock().entry(id) {
            Entry::Occupied(_) => Err(Error::DuplicateId(id)),
            Entry::Vacant(slot) => {
                slot.insert(Pending { connection_id, tx });
                Ok(CompletionSlot { id, rx })
            }
        }
    }

    /// Hand `reply` from streamer `connection_id` to whoever waits on `id`
    /// and forget the id.
    ///
    /// Returns `false` when nothing is pending under `id`, or when `id` was
    /// forwarded on another connection; such an entry stays pending. A
    /// waiter that has already gone away still counts as resolved.
    pub fn resolve(&self, id: u64, connection_id: u64, reply: Reply) -> bool {
        match self.pending.lock().entry(id) {
            Entry::Occupied(entry) if entry.get().connection_id == connection_id => {
                let _ = entry.remove().tx.send(Ok(reply));
                true
            }
            _ => false,
        }
    }

    /// Drop the entry for `id` without resolving it.
    pub fn abandon(&self, id: u64) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Fail every request forwarded on `connection_id` with
    /// [`Error::StreamerDisconnected`]. Returns how many were failed.
    pub fn fail_for_connection(&self, connection_id: u64) -> usize {
        let mut pending = self.pending.lock();
        let failed: Vec<u64> = pending
            .iter()
            .filter(|(_, p)| p.connection_id == connection_id)
            .map(|(id, _)| *id)
            .collect();

        for id in &failed {
            if let Some(p) = pending.remove(id) {
                let _ = p.tx.send(Err(Error::StreamerDisconnected));
            }
        }

        if !failed.is_empty() {
            tracing::warn!(
                connection_id,
                failed_requests = failed.len(),
                "failed in-flight requests for streamer connection"
            );
        }
        failed.len()
    }

    /// Wait for `slot` to be resolved.
    ///
    /// With a `timeout`, gives up after that long, removes the entry and
    /// returns [`Error::RequestTimeout`]. Without one, waits forever.
    pub async fn await_resolution(
        &self,
        slot: CompletionSlot,
        timeout: Option<Duration>,
    ) -> Result<Reply> {
        let CompletionSlot { id, rx } = slot;

        let received = match timeout {
            Some(after) => match tokio::time::timeout(after, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.abandon(id);
                    return Err(Error::RequestTimeout { id, after });
                }
            },
            None => rx.await,
        };

        // A dropped sender means the entry was discarded without a reply.
        received.unwrap_or(Err(Error::StreamerDisconnected))
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn ok_reply(data: Value) -> Reply {
        Reply {
            result: Some(RequestResult::Ok),
            data,
        }
    }

    #[test]
    fn allocate_counts_from_one() {
        let c = Correlator::new();
        let ids: Vec<u64> = (0..5).map(|_| c.allocate()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn concurrent_allocation_never_repeats() {
        let c = Arc::new(Correlator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = c.clone();
                std::thread::spawn(move || (0..250).map(|_| c.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(all, (1..=2000).collect::<HashSet<u64>>());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let c = Correlator::new();
        let _slot = c.register(1, 1).unwrap();
        assert!(matches!(c.register(1, 1), Err(Error::DuplicateId(1))));
        assert_eq!(c.pending_count(), 1);
    }

    #[tokio::test]
    async fn resolve_wakes_waiter_and_cleans_up() {
        let c = Correlator::new();
        let slot = c.register(c.allocate(), 1).unwrap();
        assert_eq!(slot.id(), 1);

        assert!(c.resolve(1, 1, ok_reply(json!({"zoom": 2.0}))));
        assert_eq!(c.pending_count(), 0);

        let reply = c.await_resolution(slot, None).await.unwrap();
        assert_eq!(reply, ok_reply(json!({"zoom": 2.0})));
    }

    #[tokio::test]
    async fn resolve_after_waiter_started() {
        let c = Arc::new(Correlator::new());
        let slot = c.register(7, 1).unwrap();

        let waiter = {
            let c = c.clone();
            tokio::spawn(async move { c.await_resolution(slot, None).await })
        };
        tokio::task::yield_now().await;
        assert!(c.resolve(7, 1, ok_reply(json!("late"))));

        let reply = waiter.await.unwrap().unwrap();
        assert_eq!(reply.data, json!("late"));
    }

    #[test]
    fn resolving_unknown_id_is_a_miss() {
        let c = Correlator::new();
        let _slot = c.register(1, 1).unwrap();
        assert!(!c.resolve(2, 1, ok_reply(Value::Null)));
        assert_eq!(c.pending_count(), 1);
    }

    #[test]
    fn resolving_orphaned_slot_still_cleans_up() {
        let c = Correlator::new();
        let slot = c.register(1, 1).unwrap();
        drop(slot);
        assert!(c.resolve(1, 1, ok_reply(Value::Null)));
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn reply_from_another_connection_is_a_miss() {
        let c = Correlator::new();
        let _slot = c.register(1, 2).unwrap();
        assert!(!c.resolve(1, 1, ok_reply(json!({"forged": true}))));
        assert_eq!(c.pending_count(), 1);
        assert!(c.resolve(1, 2, ok_reply(Value::Null)));
    }

    #[tokio::test]
    async fn timeout_removes_entry() {
        let c = Correlator::new();
        let slot = c.register(3, 1).unwrap();

        let err = c
            .await_resolution(slot, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestTimeout { id: 3, .. }));
        assert_eq!(c.pending_count(), 0);
        assert!(!c.resolve(3, 1, ok_reply(Value::Null)));
    }

    #[tokio::test]
    async fn fail_for_connection_only_touches_that_connection() {
        let c = Correlator::new();
        let a = c.register(1, 10).unwrap();
        let b = c.register(2, 10).unwrap();
        let other = c.register(3, 11).unwrap();

        assert_eq!(c.fail_for_connection(10), 2);
        assert_eq!(c.pending_count(), 1);

        for slot in [a, b] {
            let err = c.await_resolution(slot, None).await.unwrap_err();
            assert!(matches!(err, Error::StreamerDisconnected));
        }

        assert!(c.resolve(3, 11, ok_reply(json!(1))));
        assert_eq!(c.await_resolution(other, None).await.unwrap().data, json!(1));
    }
}
