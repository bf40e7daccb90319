//! Notification routing and object event subscriptions.

pub mod hub;
pub mod registry;

pub use hub::{EventConnection, EventHub, EventStream};
pub use registry::{NotificationCallback, NotificationRegistry};
