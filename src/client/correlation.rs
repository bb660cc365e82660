// ! Request/response correlation
// !
// ! Module allocates request ids, tracks in-flight requests, and matches
// ! inbound responses to the caller waiting on them.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::core::error::{McpError, McpResult};
use crate::protocol::types::JsonRpcResponse;

/// An in-flight request awaiting its response
#[derive(Debug)]
struct PendingRequest {
    method: String,
    sender: oneshot::Sender<McpResult<Value>>,
    issued_at: Instant,
}

/// Outcome of handing a response to the correlator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A waiting caller received the response
    Delivered,
    /// No request with this id is pending (expired, rejected or never issued)
    Unmatched,
}

/// Tracks in-flight requests by id.
///
/// Ids come from a counter that is never reset, so an id is never reused
/// for the lifetime of the correlator.
#[derive(Debug)]
pub struct RequestCorrelator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingRequest>>,
    default_timeout: Duration,
}

impl RequestCorrelator {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            default_timeout,
        }
    }

    /// Deadline applied when a caller does not pass one
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Allocate an id and start tracking a request for `method`
    pub fn register(&self, method: &str) -> (u64, oneshot::Receiver<McpResult<Value>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();

        let request = PendingRequest {
            method: method.to_string(),
            sender,
            issued_at: Instant::now(),
        };
        self.lock().insert(id, request);

        (id, receiver)
    }

    /// Route a response to its waiting caller
    pub fn complete(&self, response: JsonRpcResponse) -> Completion {
        let Some(id) = response_id(&response.id) else {
            tracing::debug!("Dropping response with non-numeric id {}", response.id);
            return Completion::Unmatched;
        };

        let Some(pending) = self.lock().remove(&id) else {
            tracing::debug!(
                "Dropping late or unknown response for request {} (no pending entry)",
                id
            );
            return Completion::Unmatched;
        };

        let outcome = match (response.error, response.result) {
            (Some(error), _) => Err(McpError::protocol(error.code, error.message, error.data)),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Null),
        };

        tracing::trace!(
            "Request {} ({}) completed in {:?}",
            id,
            pending.method,
            pending.issued_at.elapsed()
        );
        // The caller may have given up already; nothing to do then.
        let _ = pending.sender.send(outcome);
        Completion::Delivered
    }

    /// Tie the lifetime of pending entry `id` to the returned guard.
    ///
    /// Dropping the guard removes the entry, so a caller that abandons its
    /// request future does not leave it behind.
    pub fn guard(&self, id: u64) -> PendingGuard<'_> {
        PendingGuard {
            correlator: self,
            id,
        }
    }

    /// Stop tracking a request; returns whether it was still pending
    pub fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Fail every pending request with `error`. Returns how many were failed.
    pub fn reject_all(&self, error: McpError) -> usize {
        let drained: Vec<PendingRequest> = self.lock().drain().map(|(_, p)| p).collect();
        let count = drained.len();
        for pending in drained {
            let _ = pending.sender.send(Err(error.clone()));
        }
        if count > 0 {
            tracing::debug!("Rejected {} pending request(s): {}", count, error);
        }
        count
    }

    /// Number of requests awaiting a response
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: u64) -> bool {
        self.lock().contains_key(&id)
    }

    /// Await the response for `id`, enforcing `deadline`.
    ///
    /// On expiry the entry is removed so a late response is dropped.
    pub async fn wait(
        &self,
        id: u64,
        method: &str,
        receiver: oneshot::Receiver<McpResult<Value>>,
        deadline: Duration,
    ) -> McpResult<Value> {
        match tokio::time::timeout(deadline, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                self.remove(id);
                Err(McpError::disconnected("Response channel closed"))
            }
            Err(_) => {
                self.remove(id);
                Err(McpError::timeout(format!(
                    "Request {id} ({method}) timed out after {}ms",
                    deadline.as_millis()
                )))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingRequest>> {
        // A panic while holding the lock cannot leave the map inconsistent.
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes its pending entry when dropped
#[derive(Debug)]
pub struct PendingGuard<'a> {
    correlator: &'a RequestCorrelator,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.correlator.remove(self.id) {
            tracing::trace!("Request {} abandoned by its caller", self.id);
        }
    }
}

fn response_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_are_monotonic_and_unique() {
        let correlator = RequestCorrelator::new(Duration::from_secs(1));
        let (a, _ra) = correlator.register("tools/list");
        let (b, _rb) = correlator.register("tools/list");
        correlator.remove(a);
        let (c, _rc) = correlator.register("tools/list");

        assert!(a < b && b < c);
        assert_eq!(correlator.len(), 2);
    }

    #[tokio::test]
    async fn test_response_resolves_and_error_rejects() {
        let correlator = RequestCorrelator::new(Duration::from_secs(1));

        let (ok_id, ok_rx) = correlator.register("ping");
        let (err_id, err_rx) = correlator.register("tools/call");

        assert_eq!(
            correlator.complete(JsonRpcResponse::success(json!(ok_id), json!({"pong": true}))),
            Completion::Delivered
        );
        assert_eq!(
            correlator.complete(JsonRpcResponse::failure(json!(err_id), -32602, "bad args")),
            Completion::Delivered
        );

        assert_eq!(ok_rx.await.unwrap().unwrap(), json!({"pong": true}));
        match err_rx.await.unwrap() {
            Err(McpError::Protocol { code, message, .. }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "bad args");
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
        assert!(correlator.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_removes_entry_and_late_response_is_dropped() {
        let correlator = RequestCorrelator::new(Duration::from_secs(60));
        let (id, rx) = correlator.register("tools/call");

        let started = Instant::now();
        let err = correlator
            .wait(id, "tools/call", rx, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, McpError::Timeout(_)), "{err:?}");
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(!correlator.contains(id));

        let late = JsonRpcResponse::success(json!(id), json!({}));
        assert_eq!(correlator.complete(late), Completion::Unmatched);
    }

    #[tokio::test]
    async fn test_reject_all_fails_every_waiter_with_same_error() {
        let correlator = RequestCorrelator::new(Duration::from_secs(60));
        let receivers: Vec<_> = (0..4).map(|_| correlator.register("tools/list").1).collect();

        let rejected = correlator.reject_all(McpError::disconnected("client disconnected"));
        assert_eq!(rejected, 4);
        assert!(correlator.is_empty());

        for rx in receivers {
            let err = rx.await.unwrap().unwrap_err();
            assert_eq!(err.to_string(), "Disconnected: client disconnected");
        }
    }

    #[tokio::test]
    async fn test_abandoned_wait_releases_entry() {
        let correlator = RequestCorrelator::new(Duration::from_secs(60));
        let (id, rx) = correlator.register("tools/call");

        let waiting = async {
            let _pending = correlator.guard(id);
            correlator.wait(id, "tools/call", rx, Duration::from_secs(60)).await
        };
        let outer = tokio::time::timeout(Duration::from_millis(20), waiting).await;

        assert!(outer.is_err());
        assert!(!correlator.contains(id));
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_guard_after_completion_is_harmless() {
        let correlator = RequestCorrelator::new(Duration::from_secs(1));
        let (id, _rx) = correlator.register("ping");
        let (other, _other_rx) = correlator.register("ping");
        {
            let _pending = correlator.guard(id);
            correlator.complete(JsonRpcResponse::success(json!(id), json!({})));
        }
        assert!(correlator.contains(other));
        assert_eq!(correlator.len(), 1);
    }

    #[test]
    fn test_string_ids_are_matched() {
        let correlator = RequestCorrelator::new(Duration::from_secs(1));
        let (id, _rx) = correlator.register("ping");
        let response = JsonRpcResponse::success(json!(id.to_string()), json!({}));
        assert_eq!(correlator.complete(response), Completion::Delivered);
    }
}
