//! Object event subscriptions over the engine's event hub.
//!
//! `connect` asks the engine for a handler id scoped to (object, selector)
//! and observes hub notifications with that id as prefix.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::domain::config::EventHubConfig;
use crate::domain::error::{ClientError, ClientResult};
use crate::proxy::Proxy;
use crate::transport::Connection;

/// Events of one subscription, as a stream
pub type EventStream = UnboundedReceiverStream<Value>;

#[derive(Debug, Clone)]
pub struct EventHub {
    connection: Connection,
    config: Arc<EventHubConfig>,
}

impl EventHub {
    pub fn new(connection: Connection, config: EventHubConfig) -> Self {
        Self {
            connection,
            config: Arc::new(config),
        }
    }

    /// Subscribe `callback` to `selector` events of `object`.
    pub async fn connect<F>(
        &self,
        object: &Proxy,
        selector: &str,
        callback: F,
    ) -> ClientResult<EventConnection>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let method = &self.config.connect_method;
        let value = self
            .connection
            .send_value(method, vec![object.reference().to_wire(), json!(selector)])
            .await?;
        let handler_id = value
            .as_i64()
            .filter(|id| *id != 0)
            .ok_or_else(|| ClientError::unexpected(method, value))?;

        let active = Arc::new(AtomicBool::new(true));
        let gate = Arc::clone(&active);
        self.connection.notifications().observe(
            &self.config.notify_method,
            vec![json!(handler_id)],
            move |rest| {
                if gate.load(Ordering::Acquire) {
                    callback(rest.first().cloned().unwrap_or(Value::Null));
                }
            },
        );
        debug!(object = %object, selector, handler_id, "Connected event handler");

        Ok(EventConnection {
            handler_id,
            active,
            connection: self.connection.clone(),
            config: Arc::clone(&self.config),
        })
    }

    /// Like [`EventHub::connect`], delivering events through a stream.
    ///
    /// The stream ends once the subscription is disconnected and the
    /// connection drops its registration.
    pub async fn connect_stream(
        &self,
        object: &Proxy,
        selector: &str,
    ) -> ClientResult<(EventConnection, EventStream)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = self
            .connect(object, selector, move |event| {
                let _ = tx.send(event);
            })
            .await?;
        Ok((connection, UnboundedReceiverStream::new(rx)))
    }
}

/// Teardown handle of one event subscription.
///
/// Dropping it does not disconnect; call [`EventConnection::disconnect`].
#[derive(Debug)]
pub struct EventConnection {
    handler_id: i64,
    active: Arc<AtomicBool>,
    connection: Connection,
    config: Arc<EventHubConfig>,
}

impl EventConnection {
    pub fn handler_id(&self) -> i64 {
        self.handler_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop delivery, then tell the engine. Returns `Ok(false)` without any
    /// engine call if already disconnected.
    ///
    /// Delivery stops before the disconnect call is awaited, so an event
    /// racing the disconnect is dropped.
    pub async fn disconnect(&self) -> ClientResult<bool> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        let prefix = [json!(self.handler_id)];
        self.connection
            .notifications()
            .unobserve(&self.config.notify_method, &prefix);

        let value = self
            .connection
            .send_value(&self.config.disconnect_method, prefix.to_vec())
            .await?;
        debug!(handler_id = self.handler_id, result = %value, "Disconnected event handler");
        Ok(value.as_bool().unwrap_or(true))
    }
}
