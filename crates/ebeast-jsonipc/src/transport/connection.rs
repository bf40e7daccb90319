//! WebSocket connection to the sound engine.
//!
//! One socket carries three kinds of traffic:
//! - text replies, correlated to calls by request id
//! - text notifications, routed through the [`NotificationRegistry`]
//! - binary SHM snapshots, handed to a single binary handler

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::domain::config::ConnectionConfig;
use crate::domain::error::{ClientError, ClientResult};
use crate::domain::ids::RequestIdGenerator;
use crate::domain::remote::marshal_params;
use crate::domain::wire::{Frame, Request};
use crate::events::NotificationRegistry;
use crate::proxy::{ProxyRegistry, Resolved};
use crate::transport::pending::{PendingRequestStore, PendingStats};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Receiver of raw binary frames
pub type BinaryHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

pub(crate) struct ConnectionInner {
    url: String,
    outbound: mpsc::Sender<Message>,
    ids: RequestIdGenerator,
    pending: PendingRequestStore,
    notifications: Arc<NotificationRegistry>,
    proxies: Arc<ProxyRegistry>,
    binary_handler: RwLock<Option<BinaryHandler>>,
    closed: watch::Sender<bool>,
    ready: OnceLock<Value>,
}

impl ConnectionInner {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Mark the connection dead and reject everything still outstanding.
    fn shutdown(&self, reason: &str) {
        if self.closed.send_replace(true) {
            return;
        }
        let rejected = self.pending.reject_all();
        info!(url = %self.url, reason, rejected, "Jsonipc connection closed");
    }

    fn handle_text(&self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable frame");
                return;
            }
        };

        match frame {
            Frame::Reply { id, outcome } => {
                self.pending.complete(id, outcome);
            }
            Frame::Notification { method, params } => {
                let delivered = self.notifications.dispatch(&method, &params);
                debug!(method = %method, delivered, "Notification");
            }
            Frame::Unhandled(value) => {
                warn!(frame = %value, "Unhandled frame");
            }
        }
    }

    fn handle_binary(&self, data: Bytes) {
        let handler = self.binary_handler.read().clone();
        match handler {
            Some(handler) => handler(data),
            None => debug!(len = data.len(), "Binary frame without handler"),
        }
    }
}

/// Handle to the live connection; cheap to clone.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.inner.url)
            .field("closed", &self.inner.is_closed())
            .field("pending", &self.inner.pending.pending_count())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open the socket, start the reader and writer tasks and complete the
    /// handshake call. Resolves once the handshake reply arrived.
    pub(crate) async fn establish(
        config: &ConnectionConfig,
        notifications: Arc<NotificationRegistry>,
        proxies: Arc<ProxyRegistry>,
    ) -> ClientResult<Self> {
        let mut request = config.url.as_str().into_client_request()?;
        if let Some(protocol) = &config.protocol {
            let value = HeaderValue::from_str(protocol)
                .map_err(|e| ClientError::Connect(format!("invalid subprotocol: {}", e)))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        let (socket, _response) = connect_async(request).await?;
        info!(url = %config.url, "WebSocket connected");

        let (outbound, outbound_rx) = mpsc::channel(config.outbound_buffer);
        let (closed, _) = watch::channel(false);
        let inner = Arc::new(ConnectionInner {
            url: config.url.clone(),
            outbound,
            ids: RequestIdGenerator::random(),
            pending: PendingRequestStore::new(),
            notifications,
            proxies,
            binary_handler: RwLock::new(None),
            closed,
            ready: OnceLock::new(),
        });

        spawn_io(Arc::clone(&inner), socket, outbound_rx);

        let connection = Self { inner };
        let ready = match connection
            .send_value(&config.handshake_method, Vec::new())
            .await
        {
            Ok(value) => value,
            Err(ClientError::Rpc(e)) => {
                connection.close().await;
                return Err(ClientError::Handshake(e));
            }
            Err(ClientError::ConnectionClosed) => {
                return Err(ClientError::Connect(
                    "socket closed during handshake".into(),
                ));
            }
            Err(e) => {
                connection.close().await;
                return Err(e);
            }
        };
        let _ = connection.inner.ready.set(ready);
        info!(url = %config.url, "Jsonipc handshake complete");

        Ok(connection)
    }

    /// Call `method` and translate the result into proxies.
    pub async fn send(&self, method: &str, params: Vec<Value>) -> ClientResult<Resolved> {
        let value = self.send_value(method, params).await?;
        Ok(self.resolve(value))
    }

    /// Call `method` and return the raw result value.
    ///
    /// Reference-shaped parameters are reduced to `{"$id"}` before sending.
    pub async fn send_value(&self, method: &str, params: Vec<Value>) -> ClientResult<Value> {
        if self.inner.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }

        let id = self.inner.ids.next_id();
        let params = marshal_params(&params);
        let text = Request::new(id, method, &params).to_text()?;
        let rx = self.inner.pending.register(id, method);

        // the reader marks the connection closed before rejecting, so a
        // request registered after the rejection sweep is caught here
        if self.inner.is_closed() {
            self.inner.pending.discard(id);
            return Err(ClientError::ConnectionClosed);
        }

        if self
            .inner
            .outbound
            .send(Message::Text(text.into()))
            .await
            .is_err()
        {
            self.inner.pending.discard(id);
            return Err(ClientError::ConnectionClosed);
        }
        debug!(request_id = %id, method, "Sent request");

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }

    /// Translate a raw result with this connection's proxy registry
    pub fn resolve(&self, value: Value) -> Resolved {
        self.inner.proxies.resolve(value, self)
    }

    /// Handshake result, translated into proxies
    pub fn ready(&self) -> Resolved {
        self.resolve(self.inner.ready.get().cloned().unwrap_or(Value::Null))
    }

    /// Install the binary frame receiver, replacing any previous one
    pub fn set_binary_handler<F>(&self, handler: F)
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        *self.inner.binary_handler.write() = Some(Arc::new(handler));
    }

    pub fn clear_binary_handler(&self) {
        *self.inner.binary_handler.write() = None;
    }

    pub fn notifications(&self) -> &Arc<NotificationRegistry> {
        &self.inner.notifications
    }

    pub fn proxies(&self) -> &Arc<ProxyRegistry> {
        &self.inner.proxies
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Number of calls awaiting their reply
    pub fn pending_count(&self) -> usize {
        self.inner.pending.pending_count()
    }

    /// Request counters since the connection opened, handshake included
    pub fn pending_stats(&self) -> &PendingStats {
        self.inner.pending.stats()
    }

    /// How long the oldest outstanding call has been waiting
    pub fn oldest_pending_age(&self) -> Option<Duration> {
        self.inner.pending.oldest_age()
    }

    /// Resolves once the connection is closed
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Send a close frame; the connection is torn down when the engine
    /// acknowledges it or the socket drops.
    pub async fn close(&self) {
        if self.inner.is_closed() {
            return;
        }
        if self.inner.outbound.send(Message::Close(None)).await.is_err() {
            self.inner.shutdown("writer gone");
        }
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<ConnectionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

pub(crate) fn inner_is_closed(inner: &ConnectionInner) -> bool {
    inner.is_closed()
}

/// Connection wired to a channel instead of a socket
#[cfg(test)]
pub(crate) fn detached(proxies: Arc<ProxyRegistry>) -> (Connection, mpsc::Receiver<Message>) {
    let (outbound, rx) = mpsc::channel(16);
    let (closed, _) = watch::channel(false);
    let inner = Arc::new(ConnectionInner {
        url: "ws://test/".into(),
        outbound,
        ids: RequestIdGenerator::starting_at(500),
        pending: PendingRequestStore::new(),
        notifications: Arc::new(NotificationRegistry::new()),
        proxies,
        binary_handler: RwLock::new(None),
        closed,
        ready: OnceLock::new(),
    });
    (Connection::from_inner(inner), rx)
}

#[cfg(test)]
impl Connection {
    /// Feed a text frame as if the reader task received it
    pub(crate) fn inject_text(&self, text: &str) {
        self.inner.handle_text(text);
    }
}

fn spawn_io(inner: Arc<ConnectionInner>, socket: Socket, mut outbound_rx: mpsc::Receiver<Message>) {
    let (mut write, mut read) = socket.split();

    let writer_inner = Arc::clone(&inner);
    tokio::spawn(async move {
        let mut closed = writer_inner.closed.subscribe();
        loop {
            tokio::select! {
                message = outbound_rx.recv() => {
                    let Some(message) = message else { break };
                    if let Err(e) = write.send(message).await {
                        error!(error = %e, "Failed to write frame");
                        writer_inner.shutdown("write failed");
                        break;
                    }
                }
                _ = closed.changed() => break,
            }
        }
        let _ = write.close().await;
    });

    tokio::spawn(async move {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => inner.handle_text(text.as_str()),
                Ok(Message::Binary(data)) => inner.handle_binary(data),
                Ok(Message::Ping(data)) => {
                    let _ = inner.outbound.send(Message::Pong(data)).await;
                }
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "WebSocket close received");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "WebSocket error");
                    break;
                }
            }
        }
        inner.shutdown("socket closed");
    });
}
