//! Remote object proxies.
//!
//! A [`Proxy`] pairs a [`RemoteRef`] with the connection its calls travel
//! on. Typed proxies wrap a `Proxy` and implement [`RemoteObject`]; the
//! [`ProxyRegistry`] decides which `$class` tags become proxies when results
//! are translated.

pub mod registry;
pub mod server;

pub use registry::ProxyRegistry;
pub use server::{Server, ServerEngine};

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::domain::error::ClientResult;
use crate::domain::remote::RemoteRef;
use crate::transport::Connection;

/// Local handle to an engine object.
///
/// Dropping a proxy has no effect on the remote object.
#[derive(Clone)]
pub struct Proxy {
    reference: RemoteRef,
    connection: Connection,
}

impl Proxy {
    pub fn new(reference: RemoteRef, connection: Connection) -> Self {
        Self {
            reference,
            connection,
        }
    }

    pub fn id(&self) -> u64 {
        self.reference.id
    }

    pub fn class(&self) -> &str {
        &self.reference.class
    }

    pub fn reference(&self) -> &RemoteRef {
        &self.reference
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Invoke `method` on this object; `{$id}` goes first in the parameters.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> ClientResult<Resolved> {
        self.connection.send(method, self.params(args)).await
    }

    /// Like [`Proxy::call`] but returns the untranslated result
    pub async fn call_value(&self, method: &str, args: Vec<Value>) -> ClientResult<Value> {
        self.connection.send_value(method, self.params(args)).await
    }

    fn params(&self, args: Vec<Value>) -> Vec<Value> {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(self.reference.to_wire());
        params.extend(args);
        params
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Proxy").field(&self.reference).finish()
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.reference.fmt(f)
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
    }
}

impl Serialize for Proxy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.reference.serialize(serializer)
    }
}

impl From<&Proxy> for Value {
    fn from(proxy: &Proxy) -> Self {
        Value::from(&proxy.reference)
    }
}

/// A local proxy class for one or more engine `$class` tags.
pub trait RemoteObject: Sized + Send + Sync + 'static {
    /// Tags this type stands for; the first is its canonical name
    const CLASSES: &'static [&'static str];

    fn from_proxy(proxy: Proxy) -> Self;

    fn proxy(&self) -> &Proxy;

    fn accepts(class: &str) -> bool {
        Self::CLASSES.contains(&class)
    }
}

/// A result value after wire-to-proxy translation
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// `{$id, $class}` of a registered class
    Proxy(Proxy),
    /// Array, translated element-wise
    Array(Vec<Resolved>),
    /// Anything else, including references of unregistered classes
    Data(Value),
}

impl Resolved {
    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Resolved::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn into_proxy(self) -> Option<Proxy> {
        match self {
            Resolved::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Typed proxy, if this is a proxy whose class `T` accepts
    pub fn into_object<T: RemoteObject>(self) -> Option<T> {
        self.into_proxy()
            .filter(|proxy| T::accepts(proxy.class()))
            .map(T::from_proxy)
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Resolved::Data(value) => Some(value),
            _ => None,
        }
    }

    /// Back to a plain value; proxies become `{$id, $class}`
    pub fn into_value(self) -> Value {
        match self {
            Resolved::Proxy(proxy) => Value::from(&proxy),
            Resolved::Array(items) => {
                Value::Array(items.into_iter().map(Resolved::into_value).collect())
            }
            Resolved::Data(value) => value,
        }
    }
}
