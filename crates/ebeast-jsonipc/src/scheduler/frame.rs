//! Frame handler list.
//!
//! Each frame calls every registered handler once, in registration order,
//! with the current activity flag. A handler returning `false` is removed.
//! Handlers may add or remove handlers while a frame runs: additions wait for
//! the next frame, removals never cause a skip or a double call.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::debug;

type Handler = Box<dyn FnMut(bool) -> bool + Send>;

struct Entry {
    id: u64,
    handler: Arc<Mutex<Handler>>,
}

struct FrameState {
    entries: Vec<Entry>,
    /// Next index to visit in the running frame
    cur: usize,
    /// End of the running frame's scan
    max: usize,
    next_id: u64,
}

pub struct FrameScheduler {
    state: Mutex<FrameState>,
    kick: Notify,
    /// A handler was added since the last frame that ran while idle
    added: AtomicBool,
}

impl FrameScheduler {
    pub fn new(first_handler_id: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FrameState {
                entries: Vec::new(),
                cur: 0,
                max: 0,
                next_id: first_handler_id,
            }),
            kick: Notify::new(),
            added: AtomicBool::new(false),
        })
    }

    /// Register `handler`. It is called at least once, on the next frame.
    pub fn add_frame_handler<F>(self: &Arc<Self>, handler: F) -> FrameHandle
    where
        F: FnMut(bool) -> bool + Send + 'static,
    {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push(Entry {
                id,
                handler: Arc::new(Mutex::new(Box::new(handler))),
            });
            id
        };
        debug!(handler_id = id, "Added frame handler");
        self.added.store(true, Ordering::Release);
        self.kick.notify_one();

        FrameHandle {
            id,
            scheduler: Arc::downgrade(self),
        }
    }

    /// Remove handler `id`. Returns false for an unknown id.
    pub fn remove(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state.entries.iter().position(|entry| entry.id == id) else {
            debug!(handler_id = id, "Removing unknown frame handler");
            return false;
        };
        state.entries.remove(index);
        if index < state.cur {
            state.cur -= 1;
        }
        if index < state.max {
            state.max -= 1;
        }
        true
    }

    /// Run one frame: call each handler present at frame start.
    pub fn run_frame(&self, active: bool) {
        {
            let mut state = self.state.lock();
            state.cur = 0;
            state.max = state.entries.len();
        }

        loop {
            let (id, handler) = {
                let mut state = self.state.lock();
                if state.cur >= state.max {
                    break;
                }
                let entry = &state.entries[state.cur];
                let picked = (entry.id, Arc::clone(&entry.handler));
                state.cur += 1;
                picked
            };

            let keep = (handler.lock())(active);
            if !keep {
                self.remove(id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves after a handler was added since the last wait. The wakeup
    /// may be stale; check [`FrameScheduler::take_added`] before running.
    pub(crate) async fn kicked(&self) {
        self.kick.notified().await;
    }

    /// Whether a handler was added since the last call
    pub(crate) fn take_added(&self) -> bool {
        self.added.swap(false, Ordering::AcqRel)
    }
}

/// Remover of one frame handler; removal is idempotent.
#[derive(Debug, Clone)]
pub struct FrameHandle {
    id: u64,
    scheduler: Weak<FrameScheduler>,
}

impl FrameHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns whether the handler was still registered
    pub fn remove(&self) -> bool {
        self.scheduler
            .upgrade()
            .is_some_and(|scheduler| scheduler.remove(self.id))
    }
}
