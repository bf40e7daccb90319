//! Notification registry.
//!
//! Routes `{"method", "params"}` pushes to callbacks registered under the
//! method name and a positional parameter prefix.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Callback receiving the notification parameters that follow the prefix
pub type NotificationCallback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// One registration under a method
#[derive(Clone)]
struct Observer {
    prefix: Vec<Value>,
    /// Serialized prefix, used as the removal key
    prefix_key: String,
    callback: NotificationCallback,
}

impl Observer {
    fn matches(&self, params: &[Value]) -> bool {
        self.prefix.len() <= params.len()
            && self
                .prefix
                .iter()
                .zip(params)
                .all(|(want, got)| primitive_eq(want, got))
    }
}

/// Strict equality of scalar values; containers never match.
///
/// Numbers compare by value, so `5` and `5.0` are equal.
fn primitive_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        _ => false,
    }
}

fn prefix_key(prefix: &[Value]) -> String {
    // Value serialization is infallible for already-parsed values
    serde_json::to_string(prefix).unwrap_or_default()
}

/// Method -> ordered registrations
#[derive(Default)]
pub struct NotificationRegistry {
    observers: Mutex<HashMap<String, Vec<Observer>>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for notifications of `method` whose leading
    /// parameters equal `prefix`.
    pub fn observe<F>(&self, method: &str, prefix: Vec<Value>, callback: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let observer = Observer {
            prefix_key: prefix_key(&prefix),
            prefix,
            callback: Arc::new(callback),
        };
        debug!(method, prefix = %observer.prefix_key, "Observing notifications");
        self.observers
            .lock()
            .entry(method.to_string())
            .or_default()
            .push(observer);
    }

    /// Remove the first registration of `method` whose prefix serializes
    /// identically to `prefix`. Returns whether one was removed.
    pub fn unobserve(&self, method: &str, prefix: &[Value]) -> bool {
        let key = prefix_key(prefix);
        let mut observers = self.observers.lock();
        let Some(list) = observers.get_mut(method) else {
            return false;
        };
        let Some(index) = list.iter().position(|o| o.prefix_key == key) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            observers.remove(method);
        }
        debug!(method, prefix = %key, "Stopped observing notifications");
        true
    }

    /// Invoke every matching callback, in registration order, with the
    /// parameters after its prefix. Returns the number of callbacks invoked.
    ///
    /// Callbacks run without the registry lock held, so they may observe or
    /// unobserve themselves; such changes apply from the next notification on.
    pub fn dispatch(&self, method: &str, params: &[Value]) -> usize {
        let matching: Vec<Observer> = {
            let observers = self.observers.lock();
            match observers.get(method) {
                Some(list) => list.iter().filter(|o| o.matches(params)).cloned().collect(),
                None => Vec::new(),
            }
        };

        for observer in &matching {
            (observer.callback)(&params[observer.prefix.len()..]);
        }
        matching.len()
    }

    /// Number of registrations under `method`
    pub fn observer_count(&self, method: &str) -> usize {
        self.observers.lock().get(method).map_or(0, Vec::len)
    }
}
