//! SHM subscriptions, broadcast requests and snapshot delivery.
//!
//! Slot changes only mark a resync as pending and wake one long-lived resync
//! task. That task waits until no further change arrived for the debounce
//! window, then sends a single request carrying the final slot state. A burst
//! of subscribe/unsubscribe calls therefore costs one engine call on any
//! runtime flavor, including when the resync task runs on another worker.

use arc_swap::ArcSwap;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, warn};

use super::allocator::{ShmAllocator, ShmHandle};
use super::snapshot::ShmSnapshot;
use crate::domain::config::ShmConfig;
use crate::ports::EngineGateway;

pub struct ShmBroadcast {
    allocator: Mutex<ShmAllocator>,
    snapshot: ArcSwap<ShmSnapshot>,
    pending: AtomicBool,
    /// Bumped by every slot change; the resync task waits for it to settle
    changes: AtomicU64,
    wake: Arc<Notify>,
    resyncs: AtomicU64,
    engine_active: watch::Receiver<bool>,
    engine: Arc<dyn EngineGateway>,
    interval_ms: u64,
}

impl ShmBroadcast {
    /// Must be called within a Tokio runtime; spawns the resync task.
    pub fn new(
        config: &ShmConfig,
        engine_active: watch::Receiver<bool>,
        engine: Arc<dyn EngineGateway>,
    ) -> Arc<Self> {
        let shm = Arc::new(Self {
            allocator: Mutex::new(ShmAllocator::new(config.initial_size)),
            snapshot: ArcSwap::from_pointee(ShmSnapshot::zeroed(config.initial_size)),
            pending: AtomicBool::new(false),
            changes: AtomicU64::new(0),
            wake: Arc::new(Notify::new()),
            resyncs: AtomicU64::new(0),
            engine_active,
            engine,
            interval_ms: config.broadcast_interval_ms,
        });
        tokio::spawn(resync_loop(
            Arc::downgrade(&shm),
            Arc::clone(&shm.wake),
            config.resync_debounce(),
        ));
        shm
    }

    /// Subscribe to `length` bytes at engine offset `offset`; read the value
    /// at `handle.position` of each snapshot.
    pub fn subscribe(&self, offset: u64, length: usize) -> ShmHandle {
        let (handle, resync) = self.allocator.lock().subscribe(offset, length);
        debug!(offset, length, position = handle.position, index = handle.index, "SHM subscribe");
        if resync {
            self.reschedule();
        }
        handle
    }

    /// # Panics
    ///
    /// If `handle` is not currently subscribed.
    pub fn unsubscribe(&self, handle: ShmHandle) {
        let freed = self.allocator.lock().unsubscribe(handle);
        debug!(index = handle.index, freed, "SHM unsubscribe");
        if freed {
            self.reschedule();
        }
    }

    /// Queue a broadcast request for the slot state once changes settle.
    pub fn reschedule(&self) {
        self.pending.store(true, Ordering::Release);
        self.changes.fetch_add(1, Ordering::AcqRel);
        self.wake.notify_one();
    }

    /// Send the broadcast request for the current slot state now.
    pub async fn flush(&self) {
        // cleared first, so changes made while the call is in flight queue a new one
        self.pending.store(false, Ordering::Release);
        self.resyncs.fetch_add(1, Ordering::Relaxed);

        let active = *self.engine_active.borrow();
        let result = if active {
            let fragments = self.allocator.lock().fragments();
            debug!(fragments = fragments.len(), interval_ms = self.interval_ms, "SHM resync");
            self.engine
                .broadcast_shm_fragments(fragments, self.interval_ms)
                .await
        } else {
            debug!("SHM resync, delivery stopped");
            let request = self.engine.broadcast_shm_fragments(Vec::new(), 0);
            self.receive(None);
            request.await
        };

        if let Err(e) = result {
            warn!(error = %e, "SHM broadcast request failed");
        }
    }

    /// Install a delivered snapshot.
    ///
    /// The delivery is accepted only while the engine is active and when it
    /// covers every allocated slot; otherwise the snapshot becomes a zeroed
    /// buffer of the allocated size.
    pub fn receive(&self, data: Option<Bytes>) {
        let size = self.allocator.lock().binary_size();
        let active = *self.engine_active.borrow();
        let snapshot = match data {
            Some(bytes) if active && bytes.len() >= size => ShmSnapshot::delivered(bytes),
            Some(bytes) => {
                debug!(len = bytes.len(), size, active, "Rejecting SHM snapshot");
                ShmSnapshot::zeroed(size)
            }
            None => ShmSnapshot::zeroed(size),
        };
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Current snapshot; hold it for one frame at most
    pub fn snapshot(&self) -> Arc<ShmSnapshot> {
        self.snapshot.load_full()
    }

    pub fn is_snapshot_active(&self) -> bool {
        self.snapshot.load().is_active()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Broadcast requests sent so far
    pub fn resync_count(&self) -> u64 {
        self.resyncs.load(Ordering::Relaxed)
    }

    pub fn binary_size(&self) -> usize {
        self.allocator.lock().binary_size()
    }
}

impl Drop for ShmBroadcast {
    fn drop(&mut self) {
        // lets the resync task observe the dropped owner and exit
        self.wake.notify_one();
    }
}

/// Sends one broadcast request per settled burst of slot changes.
async fn resync_loop(shm: Weak<ShmBroadcast>, wake: Arc<Notify>, debounce: Duration) {
    let mut flushed = 0;
    loop {
        wake.notified().await;
        loop {
            let Some(seen) = shm.upgrade().map(|shm| shm.changes.load(Ordering::Acquire)) else {
                return;
            };
            // a stored wakeup for changes the last request already covered
            if seen == flushed {
                break;
            }
            if debounce.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(debounce).await;
            }
            let Some(this) = shm.upgrade() else {
                return;
            };
            if this.changes.load(Ordering::Acquire) == seen {
                flushed = seen;
                this.flush().await;
                break;
            }
        }
    }
}
