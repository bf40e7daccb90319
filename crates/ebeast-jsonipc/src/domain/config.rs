//! Client configuration with validation.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint and handshake
    pub connection: ConnectionConfig,
    /// Engine event hub method names
    pub events: EventHubConfig,
    /// Shared memory snapshot broadcast
    pub shm: ShmConfig,
    /// Frame loop pacing
    pub frames: FrameConfig,
    /// Remote object proxy translation
    pub proxies: ProxyConfig,
}

impl ClientConfig {
    /// Default configuration with the endpoint taken from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `EBEAST_JSONIPC_URL`: WebSocket URL of the sound engine
    /// - `EBEAST_JSONIPC_PROTOCOL`: authentication subprotocol
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("EBEAST_JSONIPC_URL") {
            config.connection.url = url;
        }
        if let Ok(protocol) = env::var("EBEAST_JSONIPC_PROTOCOL") {
            config.connection.protocol = Some(protocol).filter(|p| !p.is_empty());
        }
        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.connection.url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidUrl("url cannot be empty".into()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl(format!(
                "expected ws:// or wss:// scheme: {}",
                url
            )));
        }

        let methods = [
            ("connection.handshake_method", &self.connection.handshake_method),
            ("events.connect_method", &self.events.connect_method),
            ("events.disconnect_method", &self.events.disconnect_method),
            ("events.notify_method", &self.events.notify_method),
            ("shm.broadcast_method", &self.shm.broadcast_method),
            ("frames.engine_active_method", &self.frames.engine_active_method),
            ("frames.engine_change_event", &self.frames.engine_change_event),
        ];
        for (field, name) in methods {
            if name.is_empty() {
                return Err(ConfigError::EmptyMethod(field));
            }
        }

        if self.connection.outbound_buffer == 0 {
            return Err(ConfigError::InvalidLimit(
                "outbound_buffer cannot be 0".into(),
            ));
        }

        if self.frames.frame_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval(
                "frame_interval_ms cannot be 0".into(),
            ));
        }

        if self.shm.initial_size % 8 != 0 {
            return Err(ConfigError::InvalidLimit(format!(
                "shm.initial_size must be a multiple of 8, got {}",
                self.shm.initial_size
            )));
        }

        Ok(())
    }
}

/// WebSocket endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Engine WebSocket URL
    pub url: String,
    /// Subprotocol to request; the engine uses it as authentication token
    pub protocol: Option<String>,
    /// Reserved call issued right after the socket opens
    pub handshake_method: String,
    /// Depth of the outgoing frame queue
    pub outbound_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:27239/".to_string(),
            protocol: None,
            handshake_method: "$jsonipc.initialize".to_string(),
            outbound_buffer: 1024,
        }
    }
}

/// Engine event hub method names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventHubConfig {
    /// `(object, selector) -> handler id`
    pub connect_method: String,
    /// `(handler id) -> bool`
    pub disconnect_method: String,
    /// Notification method carrying `[handler id, event]`
    pub notify_method: String,
}

impl Default for EventHubConfig {
    fn default() -> Self {
        Self {
            connect_method: "Bse/EventHub/connect".to_string(),
            disconnect_method: "Bse/EventHub/disconnect".to_string(),
            notify_method: "Bse/EventHub/event".to_string(),
        }
    }
}

/// Shared memory snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShmConfig {
    /// Size of the empty snapshot; the first slot is placed after it
    pub initial_size: usize,
    /// Delivery interval requested while the engine is active (ms)
    pub broadcast_interval_ms: u64,
    /// Server method accepting `(fragments, interval_ms)`
    pub broadcast_method: String,
    /// Quiet period after the last slot change before the request is sent
    /// (ms); 0 only yields once
    pub resync_debounce_ms: u64,
}

impl ShmConfig {
    pub fn resync_debounce(&self) -> Duration {
        Duration::from_millis(self.resync_debounce_ms)
    }
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            initial_size: 8,
            broadcast_interval_ms: 33,
            broadcast_method: "broadcast_shm_fragments".to_string(),
            resync_debounce_ms: 1,
        }
    }
}

/// Frame loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Frame period while the engine is active (ms)
    pub frame_interval_ms: u64,
    /// Server method reporting whether the engine runs
    pub engine_active_method: String,
    /// Server event emitted when engine activity changes
    pub engine_change_event: String,
    /// First frame handler id
    pub first_handler_id: u64,
}

impl FrameConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            engine_active_method: "engine_active".to_string(),
            engine_change_event: "enginechange".to_string(),
            first_handler_id: 0x200000,
        }
    }
}

/// Proxy translation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Turn references of unregistered classes into untyped proxies
    /// instead of passing them through as plain data
    pub opaque_unknown_classes: bool,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("method name cannot be empty: {0}")]
    EmptyMethod(&'static str),

    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),
}
