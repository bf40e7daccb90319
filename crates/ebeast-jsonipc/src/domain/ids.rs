//! Request ids for reply correlation.
//!
//! Ids are plain unsigned integers on the wire. A connection starts counting
//! from a random base so that its ids never line up with counters the engine
//! keeps for other clients.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lowest possible starting id
pub const ID_BASE_MIN: u64 = 1 << 32;

/// Upper bound (exclusive) of the starting id; keeps ids exact as IEEE doubles
pub const ID_BASE_MAX: u64 = 1 << 47;

/// Request id of one outgoing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<RequestId> for u64 {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

/// Monotonic id source of one connection.
#[derive(Debug)]
pub struct RequestIdGenerator {
    next: AtomicU64,
}

impl RequestIdGenerator {
    /// Start at a random base in `[ID_BASE_MIN, ID_BASE_MAX)`
    pub fn random() -> Self {
        let base = rand::thread_rng().gen_range(ID_BASE_MIN..ID_BASE_MAX);
        Self::starting_at(base)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Next id; the engine treats id 0 as "no id", so it is skipped on wraparound
    pub fn next_id(&self) -> RequestId {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return RequestId(id);
            }
        }
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::random()
    }
}
