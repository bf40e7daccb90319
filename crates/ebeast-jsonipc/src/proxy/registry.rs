//! `$class` tag -> local proxy type registry.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::{Proxy, RemoteObject, Resolved};
use crate::domain::error::RegistryError;
use crate::domain::remote::RemoteRef;
use crate::transport::Connection;

/// Which engine classes are translated into proxies.
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    /// class tag -> name of the registering Rust type
    classes: RwLock<HashMap<String, &'static str>>,
    opaque_unknown: bool,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// References of unregistered classes become untyped proxies instead of
    /// plain data.
    pub fn with_opaque_unknown(opaque_unknown: bool) -> Self {
        Self {
            classes: RwLock::default(),
            opaque_unknown,
        }
    }

    /// Register every tag of `T`
    pub fn register<T: RemoteObject>(&self) -> Result<(), RegistryError> {
        let owner = std::any::type_name::<T>();
        let mut classes = self.classes.write();

        for class in T::CLASSES {
            if class.is_empty() {
                return Err(RegistryError::EmptyClass);
            }
            if let Some(registered_by) = classes.get(*class) {
                return Err(RegistryError::Duplicate {
                    class: class.to_string(),
                    registered_by: *registered_by,
                });
            }
        }
        for class in T::CLASSES {
            classes.insert(class.to_string(), owner);
            debug!(class, owner, "Registered proxy class");
        }
        Ok(())
    }

    pub fn is_registered(&self, class: &str) -> bool {
        self.classes.read().contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Translate a result value, turning `{$id, $class}` objects of known
    /// classes (anywhere inside arrays) into proxies bound to `connection`.
    pub fn resolve(&self, value: Value, connection: &Connection) -> Resolved {
        match value {
            Value::Array(items) => Resolved::Array(
                items
                    .into_iter()
                    .map(|item| self.resolve(item, connection))
                    .collect(),
            ),
            Value::Object(_) => match RemoteRef::from_value(&value) {
                Some(reference) if self.opaque_unknown || self.is_registered(&reference.class) => {
                    Resolved::Proxy(Proxy::new(reference, connection.clone()))
                }
                _ => Resolved::Data(value),
            },
            other => Resolved::Data(other),
        }
    }
}
