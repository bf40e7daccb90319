//! Session: the composition root.
//!
//! Wires one connection to the server proxy, the event hub, SHM delivery and
//! the frame loop:
//!
//! ```text
//! enginechange event ──> watch<bool> ──┬──> FrameDriver ──> frame handlers
//!                                      └──> ShmBroadcast.reschedule()
//! binary frames ───────────────────────────> ShmBroadcast.receive()
//! ```

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::config::ClientConfig;
use crate::domain::error::{ClientError, ClientResult};
use crate::events::{EventConnection, EventHub};
use crate::ports::EngineGateway;
use crate::proxy::{RemoteObject, Server, ServerEngine};
use crate::scheduler::{FrameDriver, FrameHandle, FrameScheduler};
use crate::shm::{ShmBroadcast, ShmHandle, ShmSnapshot};
use crate::transport::{Connection, Connector};

pub struct Session {
    connection: Connection,
    server: Server,
    hub: EventHub,
    shm: Arc<ShmBroadcast>,
    frames: Arc<FrameScheduler>,
    engine_active: watch::Receiver<bool>,
    engine_events: EventConnection,
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open the connection through `connector` and start the frame loop.
    pub async fn start(connector: &Connector, config: &ClientConfig) -> ClientResult<Self> {
        config.validate()?;

        let proxies = connector.proxies();
        if !Server::CLASSES.iter().any(|class| proxies.is_registered(class)) {
            proxies.register::<Server>()?;
        }

        let connection = connector.open(&config.connection).await?;
        match Self::wire(connection.clone(), config).await {
            Ok(session) => Ok(session),
            Err(e) => {
                warn!(error = %e, "Session setup failed, closing connection");
                connection.close().await;
                Err(e)
            }
        }
    }

    async fn wire(connection: Connection, config: &ClientConfig) -> ClientResult<Self> {
        let ready = connection.ready();
        let server = ready
            .clone()
            .into_object::<Server>()
            .ok_or_else(|| {
                ClientError::unexpected(&config.connection.handshake_method, ready.into_value())
            })?;

        let (engine_tx, engine_active) = watch::channel(false);
        let engine_tx = Arc::new(engine_tx);
        let engine = Arc::new(ServerEngine::new(server.clone(), &config.frames, &config.shm));
        let shm = ShmBroadcast::new(&config.shm, engine_active.clone(), engine.clone());

        {
            let shm = Arc::downgrade(&shm);
            connection.set_binary_handler(move |data| {
                if let Some(shm) = shm.upgrade() {
                    shm.receive(Some(data));
                }
            });
        }

        let hub = EventHub::new(connection.clone(), config.events.clone());
        let engine_events = {
            let engine_tx = Arc::clone(&engine_tx);
            hub.connect(
                server.proxy(),
                &config.frames.engine_change_event,
                move |event| {
                    let active = event.get("active").and_then(Value::as_bool).unwrap_or(false);
                    engine_tx.send_replace(active);
                },
            )
            .await?
        };

        let active = engine.engine_active().await?;
        engine_tx.send_replace(active);
        shm.reschedule();

        let frames = FrameScheduler::new(config.frames.first_handler_id);
        let driver = FrameDriver::new(
            Arc::clone(&frames),
            Arc::clone(&shm),
            engine_active.clone(),
            config.frames.frame_interval(),
        );
        let mut tasks = vec![tokio::spawn(driver.run())];

        // a dead connection reports the engine as inactive
        {
            let connection = connection.clone();
            let engine_tx = Arc::clone(&engine_tx);
            tasks.push(tokio::spawn(async move {
                connection.closed().await;
                engine_tx.send_replace(false);
            }));
        }

        info!(server = %server.proxy(), active, "Session started");
        Ok(Self {
            connection,
            server,
            hub,
            shm,
            frames,
            engine_active,
            engine_events,
            tasks,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn shm(&self) -> &Arc<ShmBroadcast> {
        &self.shm
    }

    pub fn frames(&self) -> &Arc<FrameScheduler> {
        &self.frames
    }

    pub fn is_engine_active(&self) -> bool {
        *self.engine_active.borrow()
    }

    /// Engine activity as a watch channel
    pub fn engine_activity(&self) -> watch::Receiver<bool> {
        self.engine_active.clone()
    }

    pub fn add_frame_handler<F>(&self, handler: F) -> FrameHandle
    where
        F: FnMut(bool) -> bool + Send + 'static,
    {
        self.frames.add_frame_handler(handler)
    }

    pub fn shm_subscribe(&self, offset: u64, length: usize) -> ShmHandle {
        self.shm.subscribe(offset, length)
    }

    pub fn shm_unsubscribe(&self, handle: ShmHandle) {
        self.shm.unsubscribe(handle)
    }

    pub fn snapshot(&self) -> Arc<ShmSnapshot> {
        self.shm.snapshot()
    }

    /// Disconnect engine events, stop the frame loop and close the connection.
    pub async fn shutdown(self) {
        info!("Shutting down session");
        if let Err(e) = self.engine_events.disconnect().await {
            warn!(error = %e, "Failed to disconnect engine events");
        }
        for task in &self.tasks {
            task.abort();
        }
        self.connection.clear_binary_handler();
        self.connection.close().await;
        self.connection.closed().await;
        info!("Session stopped");
    }
}
