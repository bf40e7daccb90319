//! Pending request store.
//!
//! Maps request ids to callers awaiting their reply frame.

use crate::domain::error::{ClientError, RpcError};
use crate::domain::ids::RequestId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Settled outcome delivered to a waiting caller
pub type ReplyOutcome = Result<serde_json::Value, ClientError>;

/// A request waiting for its reply
struct PendingRequest {
    /// Channel to send the outcome
    sender: oneshot::Sender<ReplyOutcome>,
    /// When the request was sent
    created_at: Instant,
    /// Method name (for logging)
    method: String,
}

/// Statistics for the pending request store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total requests settled by a reply
    pub total_completed: AtomicU64,
    /// Total requests rejected without a reply (connection closed)
    pub total_rejected: AtomicU64,
    /// Replies whose caller went away before settlement
    pub total_cancelled: AtomicU64,
    /// Replies carrying an id that was not outstanding
    pub total_unknown: AtomicU64,
}

/// Pending request store.
///
/// Flow:
/// 1. `send()` allocates a request id
/// 2. `register()` stores a oneshot sender under that id
/// 3. The frame is written to the socket
/// 4. The reader task calls `complete()` when the reply frame arrives
/// 5. The caller awaits the receiver
///
/// Each entry is removed on lookup, so a reply settles its request at most once.
pub struct PendingRequestStore {
    pending: DashMap<RequestId, PendingRequest>,
    stats: PendingStats,
}

impl PendingRequestStore {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            stats: PendingStats::default(),
        }
    }

    /// Register a pending request and get a receiver for its outcome.
    pub fn register(&self, id: RequestId, method: &str) -> oneshot::Receiver<ReplyOutcome> {
        let (tx, rx) = oneshot::channel();

        let request = PendingRequest {
            sender: tx,
            created_at: Instant::now(),
            method: method.to_string(),
        };

        if self.pending.insert(id, request).is_some() {
            // ids come from a monotonic counter; a collision means wraparound
            // onto a request that is still outstanding
            warn!(request_id = %id, method, "Request id collision, dropping older request");
        }
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(request_id = %id, method, "Registered pending request");

        rx
    }

    /// Settle a pending request with its reply.
    ///
    /// Returns true if the request was outstanding and its caller received the outcome.
    pub fn complete(&self, id: RequestId, outcome: Result<serde_json::Value, RpcError>) -> bool {
        let Some((_, pending)) = self.pending.remove(&id) else {
            self.stats.total_unknown.fetch_add(1, Ordering::Relaxed);
            warn!(request_id = %id, "Reply for unknown request id");
            return false;
        };

        let response_time = pending.created_at.elapsed();
        match pending.sender.send(outcome.map_err(ClientError::Rpc)) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request_id = %id,
                    method = pending.method,
                    response_time_ms = response_time.as_millis(),
                    "Completed pending request"
                );
                true
            }
            Err(_) => {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request_id = %id,
                    method = pending.method,
                    "Pending request receiver dropped"
                );
                false
            }
        }
    }

    /// Forget a request whose frame never made it onto the socket.
    pub fn discard(&self, id: RequestId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Reject every outstanding request with `ConnectionClosed`.
    ///
    /// Returns the number of requests rejected.
    pub fn reject_all(&self) -> usize {
        let ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut rejected = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                debug!(
                    request_id = %id,
                    method = pending.method,
                    waited_ms = pending.created_at.elapsed().as_millis(),
                    "Rejecting pending request on close"
                );
                let _ = pending.sender.send(Err(ClientError::ConnectionClosed));
                rejected += 1;
            }
        }
        self.stats
            .total_rejected
            .fetch_add(rejected as u64, Ordering::Relaxed);
        rejected
    }

    /// Get number of currently pending requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a request id is pending
    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }

    /// Age of the oldest outstanding request
    pub fn oldest_age(&self) -> Option<Duration> {
        self.pending
            .iter()
            .map(|entry| entry.value().created_at.elapsed())
            .max()
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

impl Default for PendingRequestStore {
    fn default() -> Self {
        Self::new()
    }
}
