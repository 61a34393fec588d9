//! Descriptors for objects that live in the remote runtime.

use crate::error::RpcError;
use crate::ids::Uid;
use serde_json::{Map, Value};

/// Field that marks a JSON object as a remote object descriptor.
pub const UNIQUE_ID_KEY: &str = "__uniqueid";

/// `instanceof` tag of remote collections that accept any member name.
pub const ENUMERATOR_TAG: &str = "Enumerator";

/// Returns true when `value` is a remote object descriptor.
pub fn is_handle(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key(UNIQUE_ID_KEY))
}

/// A parsed remote object descriptor.
///
/// The raw descriptor is kept alongside its serialized form so it can be
/// sent back to the remote side without re-encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteHandle {
    uid: Uid,
    properties: Vec<String>,
    methods: Map<String, Value>,
    instance_of: Option<String>,
    data: Value,
    serialized: String,
}

impl RemoteHandle {
    pub fn parse(value: &Value) -> Result<Self, RpcError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RpcError::bad_request("Remote handle must be a JSON object"))?;

        let uid = obj
            .get(UNIQUE_ID_KEY)
            .and_then(uid_from_value)
            .ok_or_else(|| {
                RpcError::bad_request(format!("Remote handle has an invalid {}", UNIQUE_ID_KEY))
            })?;

        let properties = match obj.get("properties") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Some(other) => {
                return Err(RpcError::bad_request(format!(
                    "Remote handle properties must be an array, got {}",
                    other
                )))
            }
        };

        let methods = match obj.get("methods") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            // Some hosts list method names instead of describing them.
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(|name| name.as_str())
                .map(|name| (name.to_string(), Value::Null))
                .collect(),
            Some(other) => {
                return Err(RpcError::bad_request(format!(
                    "Remote handle methods must be an object, got {}",
                    other
                )))
            }
        };

        let instance_of = obj
            .get("instanceof")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(RemoteHandle {
            uid,
            properties,
            methods,
            instance_of,
            data: value.clone(),
            serialized: serde_json::to_string(value)?,
        })
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn methods(&self) -> &Map<String, Value> {
        &self.methods
    }

    pub fn instance_of(&self) -> Option<&str> {
        self.instance_of.as_deref()
    }

    /// The descriptor exactly as received.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The descriptor's JSON text, cached at parse time.
    pub fn serialized(&self) -> &str {
        &self.serialized
    }

    pub fn is_enumerator(&self) -> bool {
        self.instance_of.as_deref() == Some(ENUMERATOR_TAG)
    }

    /// Whether `name` is one of the declared properties or methods.
    pub fn declares(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p == name) || self.methods.contains_key(name)
    }

    /// Whether a `get` for `name` may be forwarded to the remote side.
    pub fn exposes(&self, name: &str) -> bool {
        self.declares(name) || self.is_enumerator()
    }
}

fn uid_from_value(value: &Value) -> Option<Uid> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .map(Uid::new),
        Value::String(s) => s.parse::<u64>().ok().map(Uid::new),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_descriptor() {
        let value = json!({
            "__uniqueid": 12,
            "name": "Document",
            "instanceof": "Document",
            "properties": ["name", "layers"],
            "methods": {"save": {"name": "save", "arguments": []}},
        });
        let handle = RemoteHandle::parse(&value).unwrap();

        assert_eq!(handle.uid(), Uid::new(12));
        assert_eq!(handle.properties(), &["name".to_string(), "layers".to_string()]);
        assert!(handle.declares("save"));
        assert!(handle.declares("layers"));
        assert!(!handle.declares("close"));
        assert_eq!(handle.instance_of(), Some("Document"));
        assert_eq!(handle.data(), &value);
        assert_eq!(
            serde_json::from_str::<Value>(handle.serialized()).unwrap(),
            value
        );
    }

    #[test]
    fn test_missing_surface_defaults_to_empty() {
        let handle = RemoteHandle::parse(&json!({"__uniqueid": 3})).unwrap();
        assert!(handle.properties().is_empty());
        assert!(handle.methods().is_empty());
        assert!(!handle.exposes("anything"));
    }

    #[test]
    fn test_enumerator_exposes_any_name() {
        let handle = RemoteHandle::parse(&json!({
            "__uniqueid": 4,
            "instanceof": "Enumerator",
            "properties": [],
            "methods": {},
        }))
        .unwrap();
        assert!(handle.is_enumerator());
        assert!(!handle.declares("PIXELS"));
        assert!(handle.exposes("PIXELS"));
    }

    #[test]
    fn test_rejects_non_descriptors() {
        assert!(RemoteHandle::parse(&json!(5)).is_err());
        assert!(RemoteHandle::parse(&json!({"__uniqueid": "abc"})).is_err());
        assert!(RemoteHandle::parse(&json!({"__uniqueid": 1, "properties": "x"})).is_err());
    }

    #[test]
    fn test_is_handle() {
        assert!(is_handle(&json!({"__uniqueid": 1})));
        assert!(!is_handle(&json!({"uid": 1})));
        assert!(!is_handle(&json!("__uniqueid")));
        assert!(!is_handle(&Value::Null));
    }
}
