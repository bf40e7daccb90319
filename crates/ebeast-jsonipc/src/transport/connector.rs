//! Single-connection slot.
//!
//! At most one live [`Connection`] exists per connector; a second `open`
//! while one is opening or live fails with [`ClientError::AlreadyOpen`].

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

use super::connection::{inner_is_closed, Connection, ConnectionInner};
use crate::domain::config::{ClientConfig, ConnectionConfig};
use crate::domain::error::{ClientError, ClientResult};
use crate::events::NotificationRegistry;
use crate::proxy::ProxyRegistry;

enum Slot {
    Vacant,
    Opening,
    Live(Weak<ConnectionInner>),
}

/// Factory that refuses to open a second connection
pub struct Connector {
    slot: Mutex<Slot>,
    proxies: Arc<ProxyRegistry>,
}

/// Frees the slot if `open` fails or its future is dropped mid-way
struct OpeningGuard<'a> {
    slot: &'a Mutex<Slot>,
    armed: bool,
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.slot.lock() = Slot::Vacant;
        }
    }
}

impl Connector {
    pub fn new(proxies: Arc<ProxyRegistry>) -> Self {
        Self {
            slot: Mutex::new(Slot::Vacant),
            proxies,
        }
    }

    /// Connector whose proxy registry follows `config.proxies`
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(Arc::new(ProxyRegistry::with_opaque_unknown(
            config.proxies.opaque_unknown_classes,
        )))
    }

    pub fn proxies(&self) -> &Arc<ProxyRegistry> {
        &self.proxies
    }

    /// Open the connection and complete the handshake.
    ///
    /// Each connection gets a fresh notification registry; proxy classes are
    /// shared across connections of this connector.
    pub async fn open(&self, config: &ConnectionConfig) -> ClientResult<Connection> {
        {
            let mut slot = self.slot.lock();
            let busy = match &*slot {
                Slot::Vacant => false,
                Slot::Opening => true,
                Slot::Live(weak) => weak
                    .upgrade()
                    .is_some_and(|inner| !inner_is_closed(&inner)),
            };
            if busy {
                return Err(ClientError::AlreadyOpen);
            }
            *slot = Slot::Opening;
        }
        let mut guard = OpeningGuard {
            slot: &self.slot,
            armed: true,
        };

        let connection = Connection::establish(
            config,
            Arc::new(NotificationRegistry::new()),
            Arc::clone(&self.proxies),
        )
        .await?;

        guard.armed = false;
        *self.slot.lock() = Slot::Live(connection.downgrade());
        debug!(url = %config.url, "Connection slot occupied");
        Ok(connection)
    }

    /// The live connection, if any
    pub fn current(&self) -> Option<Connection> {
        match &*self.slot.lock() {
            Slot::Live(weak) => weak
                .upgrade()
                .filter(|inner| !inner_is_closed(inner))
                .map(Connection::from_inner),
            _ => None,
        }
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new(Arc::new(ProxyRegistry::new()))
    }
}
