use crate::args::Arg;
use crate::communicator::Session;
use cep_rpc_core::{RemoteHandle, RpcError, Uid};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// How a proxy responds to `call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    /// Functions, methods and ordinary objects: `call` goes remote.
    Callable,
    /// An object produced by `new`. Calling it again returns itself.
    Instance,
}

/// Where a `set` ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Remote,
    Local,
}

/// Local stand-in for an object that lives in the remote runtime.
///
/// Clones share one identity: every descriptor with the same uid resolves
/// to the same underlying proxy for the lifetime of its communicator.
#[derive(Clone)]
pub struct RemoteObject {
    inner: Arc<ProxyInner>,
}

struct ProxyInner {
    handle: RemoteHandle,
    kind: ProxyKind,
    parent: Option<RemoteObject>,
    session: Weak<Session>,
    locals: Mutex<HashMap<String, RemoteValue>>,
}

impl RemoteObject {
    pub(crate) fn new(
        handle: RemoteHandle,
        kind: ProxyKind,
        parent: Option<RemoteObject>,
        session: Weak<Session>,
    ) -> Self {
        RemoteObject {
            inner: Arc::new(ProxyInner {
                handle,
                kind,
                parent,
                session,
                locals: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn uid(&self) -> Uid {
        self.inner.handle.uid()
    }

    pub fn handle(&self) -> &RemoteHandle {
        &self.inner.handle
    }

    /// The descriptor as received, which is what gets sent back when this
    /// object is passed as an argument.
    pub fn data(&self) -> &Value {
        self.inner.handle.data()
    }

    pub fn serialized(&self) -> &str {
        self.inner.handle.serialized()
    }

    /// The object this proxy was read from, if it came from a `get`.
    pub fn parent(&self) -> Option<&RemoteObject> {
        self.inner.parent.as_ref()
    }

    pub fn kind(&self) -> ProxyKind {
        self.inner.kind
    }

    /// Whether both values are the same proxy, not merely equal descriptors.
    pub fn ptr_eq(&self, other: &RemoteObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn session(&self) -> Result<Arc<Session>, RpcError> {
        self.inner
            .session
            .upgrade()
            .ok_or_else(|| RpcError::disconnected("Communicator has been dropped"))
    }

    /// Reads a property or method.
    ///
    /// Local attributes win. Otherwise the name must be part of the declared
    /// surface (any name is accepted on enumerators) or no request is sent.
    pub fn get(&self, name: &str) -> Result<RemoteValue, RpcError> {
        if let Some(value) = self.local(name) {
            return Ok(value);
        }
        if !self.inner.handle.exposes(name) {
            return Err(RpcError::no_such_attribute(name));
        }
        self.session()?.get(self, name)
    }

    /// Writes a declared property remotely; any other name is kept on the
    /// local proxy only.
    pub fn set(&self, name: &str, value: impl Into<RemoteValue>) -> Result<Assignment, RpcError> {
        let value = value.into();
        if self.inner.handle.declares(name) {
            self.session()?.set(self, name, &value)?;
            Ok(Assignment::Remote)
        } else {
            self.inner.locals.lock().insert(name.to_string(), value);
            Ok(Assignment::Local)
        }
    }

    pub fn local(&self, name: &str) -> Option<RemoteValue> {
        self.inner.locals.lock().get(name).cloned()
    }

    /// Invokes the remote callable, bound to its parent when it has one.
    pub fn call(&self, args: Vec<Arg>) -> Result<RemoteValue, RpcError> {
        match self.inner.kind {
            ProxyKind::Instance => Ok(RemoteValue::Remote(self.clone())),
            ProxyKind::Callable => self.session()?.call(self, args, self.parent()),
        }
    }

    pub fn index(&self, index: usize) -> Result<RemoteValue, RpcError> {
        self.session()?.get_index(self, index)
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("uid", &self.uid())
            .field("kind", &self.inner.kind)
            .field("instance_of", &self.inner.handle.instance_of())
            .field("parent", &self.parent().map(RemoteObject::uid))
            .finish()
    }
}

/// A decoded RPC result: either a proxy or a plain JSON value.
#[derive(Debug, Clone)]
pub enum RemoteValue {
    Remote(RemoteObject),
    Json(Value),
}

impl RemoteValue {
    pub fn as_remote(&self) -> Option<&RemoteObject> {
        match self {
            RemoteValue::Remote(object) => Some(object),
            RemoteValue::Json(_) => None,
        }
    }

    pub fn into_remote(self) -> Option<RemoteObject> {
        match self {
            RemoteValue::Remote(object) => Some(object),
            RemoteValue::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            RemoteValue::Json(value) => Some(value),
            RemoteValue::Remote(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            RemoteValue::Json(value) => Some(value),
            RemoteValue::Remote(_) => None,
        }
    }

    /// The remote object, or a `BadRequest` naming what came back instead.
    pub fn expect_remote(self, what: &str) -> Result<RemoteObject, RpcError> {
        match self {
            RemoteValue::Remote(object) => Ok(object),
            RemoteValue::Json(value) => Err(RpcError::bad_request(format!(
                "Expected {} to be a remote object, got {}",
                what, value
            ))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, RemoteValue::Remote(_))
    }

    /// The JSON sent on the wire for this value.
    pub fn to_wire(&self) -> Value {
        match self {
            RemoteValue::Remote(object) => object.data().clone(),
            RemoteValue::Json(value) => value.clone(),
        }
    }
}

impl From<RemoteObject> for RemoteValue {
    fn from(object: RemoteObject) -> Self {
        RemoteValue::Remote(object)
    }
}

impl From<Value> for RemoteValue {
    fn from(value: Value) -> Self {
        RemoteValue::Json(value)
    }
}

impl From<&str> for RemoteValue {
    fn from(value: &str) -> Self {
        RemoteValue::Json(Value::from(value))
    }
}

impl From<String> for RemoteValue {
    fn from(value: String) -> Self {
        RemoteValue::Json(Value::from(value))
    }
}

impl From<bool> for RemoteValue {
    fn from(value: bool) -> Self {
        RemoteValue::Json(Value::from(value))
    }
}

impl From<i64> for RemoteValue {
    fn from(value: i64) -> Self {
        RemoteValue::Json(Value::from(value))
    }
}

impl From<f64> for RemoteValue {
    fn from(value: f64) -> Self {
        RemoteValue::Json(Value::from(value))
    }
}

impl PartialEq<Value> for RemoteValue {
    fn eq(&self, other: &Value) -> bool {
        self.as_json() == Some(other)
    }
}
