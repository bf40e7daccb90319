//! Shared-memory snapshot channel.
//!
//! Widgets subscribe to byte ranges of the engine's shared memory; the
//! engine streams the union of all active ranges as binary frames.

pub mod allocator;
pub mod broadcast;
pub mod snapshot;

pub use allocator::{ShmAllocator, ShmFragment, ShmHandle};
pub use broadcast::ShmBroadcast;
pub use snapshot::ShmSnapshot;
