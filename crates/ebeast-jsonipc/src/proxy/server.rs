//! The engine's singleton server object.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Proxy, RemoteObject, Resolved};
use crate::domain::config::{FrameConfig, ShmConfig};
use crate::domain::error::{ClientError, ClientResult};
use crate::ports::EngineGateway;
use crate::shm::ShmFragment;

/// Typed proxy for the object returned by the handshake
#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    proxy: Proxy,
}

impl RemoteObject for Server {
    const CLASSES: &'static [&'static str] = &["Bse::ServerImpl", "Bse::Server"];

    fn from_proxy(proxy: Proxy) -> Self {
        Self { proxy }
    }

    fn proxy(&self) -> &Proxy {
        &self.proxy
    }
}

impl Server {
    pub async fn call(&self, method: &str, args: Vec<Value>) -> ClientResult<Resolved> {
        self.proxy.call(method, args).await
    }

    pub async fn call_value(&self, method: &str, args: Vec<Value>) -> ClientResult<Value> {
        self.proxy.call_value(method, args).await
    }
}

/// [`EngineGateway`] over the server object, using the configured method names
#[derive(Debug, Clone)]
pub struct ServerEngine {
    server: Server,
    engine_active_method: String,
    broadcast_method: String,
}

impl ServerEngine {
    pub fn new(server: Server, frames: &FrameConfig, shm: &ShmConfig) -> Self {
        Self {
            server,
            engine_active_method: frames.engine_active_method.clone(),
            broadcast_method: shm.broadcast_method.clone(),
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }
}

#[async_trait]
impl EngineGateway for ServerEngine {
    async fn broadcast_shm_fragments(
        &self,
        fragments: Vec<ShmFragment>,
        interval_ms: u64,
    ) -> ClientResult<()> {
        let fragments = serde_json::to_value(fragments)?;
        self.server
            .call_value(&self.broadcast_method, vec![fragments, json!(interval_ms)])
            .await?;
        Ok(())
    }

    async fn engine_active(&self) -> ClientResult<bool> {
        let value = self
            .server
            .call_value(&self.engine_active_method, Vec::new())
            .await?;
        value
            .as_bool()
            .ok_or_else(|| ClientError::unexpected(&self.engine_active_method, value))
    }
}
