//! Driven ports (outbound dependencies)

use async_trait::async_trait;

use crate::domain::error::ClientResult;
use crate::shm::ShmFragment;

/// Engine calls the client issues on its own behalf
#[async_trait]
pub trait EngineGateway: Send + Sync {
    /// Ask the engine to send the listed fragments as one binary frame every
    /// `interval_ms` milliseconds. An empty list with interval 0 stops delivery.
    async fn broadcast_shm_fragments(
        &self,
        fragments: Vec<ShmFragment>,
        interval_ms: u64,
    ) -> ClientResult<()>;

    /// Whether audio processing is currently running
    async fn engine_active(&self) -> ClientResult<bool>;
}
