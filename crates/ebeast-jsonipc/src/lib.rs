#![allow(missing_docs)]

//! ebeast-jsonipc - Jsonipc client bridge to the sound engine.
//!
//! One WebSocket carries JSON calls, engine notifications and binary
//! shared-memory snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              Session                                  │
//! │                                                                       │
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────┐  ┌───────────┐ │
//! │  │   Proxies   │   │  EventHub   │   │ ShmBroadcast │  │  Frames   │ │
//! │  │ $id/$class  │   │ connect/    │   │ slots, resync│  │ handlers, │ │
//! │  │ translation │   │ disconnect  │   │ snapshots    │  │ driver    │ │
//! │  └──────┬──────┘   └──────┬──────┘   └──────┬───────┘  └─────┬─────┘ │
//! │         │                 │                 │                │       │
//! │  ┌──────┴─────────────────┴─────────────────┴────────────────┘       │
//! │  │                        Connection                                  │
//! │  │   pending requests │ notification registry │ binary handler        │
//! │  └──────────────────────────────┬─────────────────────────────────────┘
//! └─────────────────────────────────┼─────────────────────────────────────┘
//!                                   │ WebSocket
//!                                   ▼
//!                              sound engine
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ebeast_jsonipc::{ClientConfig, Connector, Session};
//!
//! let config = ClientConfig::from_env();
//! let connector = Connector::from_config(&config);
//! let session = Session::start(&connector, &config).await?;
//!
//! let level = session.shm_subscribe(offset, 4);
//! session.add_frame_handler(move |active| {
//!     // read session snapshot at level.position
//!     true
//! });
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod events;
pub mod ports;
pub mod proxy;
pub mod scheduler;
pub mod session;
pub mod shm;
pub mod transport;

pub use domain::config::ClientConfig;
pub use domain::error::{ClientError, ClientResult, RegistryError, RpcError};
pub use domain::remote::RemoteRef;
pub use events::{EventConnection, EventHub, NotificationRegistry};
pub use ports::EngineGateway;
pub use proxy::{Proxy, ProxyRegistry, RemoteObject, Resolved, Server};
pub use scheduler::{FrameHandle, FrameScheduler};
pub use session::Session;
pub use shm::{ShmBroadcast, ShmFragment, ShmHandle, ShmSnapshot};
pub use transport::{Connection, Connector};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
