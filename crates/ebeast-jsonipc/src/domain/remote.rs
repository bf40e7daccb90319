//! Remote object references and their wire form.
//!
//! The engine owns every object; the client only ever holds `{$id, $class}`
//! handles. Outgoing arguments are reduced to `{"$id": n}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const ID_KEY: &str = "$id";
pub const CLASS_KEY: &str = "$class";

/// Non-owning handle to an engine object.
///
/// Two references with the same id denote the same remote object, whatever
/// their class tag says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRef {
    #[serde(rename = "$id")]
    pub id: u64,
    #[serde(rename = "$class")]
    pub class: String,
}

impl RemoteRef {
    pub fn new(id: u64, class: impl Into<String>) -> Self {
        Self {
            id,
            class: class.into(),
        }
    }

    /// Parse a `{$id, $class, ...}` value; `None` for anything else
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let id = positive_id(object)?;
        let class = object.get(CLASS_KEY)?.as_str()?;
        Some(Self::new(id, class))
    }

    /// Minimal wire form used in call parameters
    pub fn to_wire(&self) -> Value {
        wire_ref(self.id)
    }
}

impl PartialEq for RemoteRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RemoteRef {}

impl std::hash::Hash for RemoteRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class, self.id)
    }
}

impl From<&RemoteRef> for Value {
    fn from(r: &RemoteRef) -> Self {
        serde_json::json!({ ID_KEY: r.id, CLASS_KEY: r.class })
    }
}

fn wire_ref(id: u64) -> Value {
    let mut object = Map::with_capacity(1);
    object.insert(ID_KEY.to_string(), Value::from(id));
    Value::Object(object)
}

fn positive_id(object: &Map<String, Value>) -> Option<u64> {
    object.get(ID_KEY)?.as_u64().filter(|id| *id > 0)
}

/// Reduce every reference-shaped value (object with a positive `$id`) to its
/// `{"$id"}` form, recursing through arrays and plain objects.
pub fn marshal(value: &Value) -> Value {
    match value {
        Value::Object(object) => match positive_id(object) {
            Some(id) => wire_ref(id),
            None => Value::Object(
                object
                    .iter()
                    .map(|(key, v)| (key.clone(), marshal(v)))
                    .collect(),
            ),
        },
        Value::Array(items) => Value::Array(items.iter().map(marshal).collect()),
        other => other.clone(),
    }
}

/// [`marshal`] applied to a parameter list
pub fn marshal_params(params: &[Value]) -> Vec<Value> {
    params.iter().map(marshal).collect()
}
