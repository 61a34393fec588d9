//! Blocking RPC over an event transport.
//!
//! Every primitive sends one `execute_command` request and then polls the
//! transport in short slices until the `return` event carrying the same id
//! shows up. Frames seen while polling are routed by whoever happens to be
//! pumping: responses land in the pending table, anything else goes to the
//! registered event handlers.

use crate::args::{prepare_params, Arg};
use crate::pending::PendingResults;
use crate::proxy::{ProxyKind, RemoteObject, RemoteValue};
use crate::registry::ProxyRegistry;
use crate::scope::ProxyScope;
use cep_rpc_core::{
    channel, decode_response, is_handle, CallId, CallIdAllocator, ErrorCode, Method,
    RemoteHandle, Request, RpcError,
};
use cep_rpc_transport::{EventFrame, Transport, TransportError};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback for a named inbound event.
pub type EventHandler = Arc<dyn Fn(&Value) -> Result<(), RpcError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CommunicatorConfig {
    /// Longest single slice the transport is pumped for while waiting.
    pub poll_interval: Duration,
    /// How long a call waits for its response before failing.
    pub response_timeout: Duration,
    /// Log every outbound payload at info level.
    pub network_debug: bool,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            response_timeout: Duration::from_secs(300),
            network_debug: false,
        }
    }
}

/// State shared by a communicator and every proxy it hands out.
pub(crate) struct Session {
    transport: Mutex<Box<dyn Transport>>,
    ids: CallIdAllocator,
    pending: PendingResults,
    registry: ProxyRegistry,
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
    disconnected: AtomicBool,
    config: CommunicatorConfig,
}

/// Owns the transport to one panel and exposes the RPC primitives.
///
/// Cloning is cheap and every clone talks through the same transport,
/// id allocator, pending table and proxy registry.
#[derive(Clone)]
pub struct Communicator {
    session: Arc<Session>,
    scope: Arc<ProxyScope>,
}

impl Communicator {
    /// Takes ownership of `transport` and fetches the remote global scope.
    pub fn connect<T>(transport: T, config: CommunicatorConfig) -> Result<Self, RpcError>
    where
        T: Transport + 'static,
    {
        let session = Arc::new(Session {
            transport: Mutex::new(Box::new(transport)),
            ids: CallIdAllocator::new(),
            pending: PendingResults::new(),
            registry: ProxyRegistry::new(),
            handlers: RwLock::new(HashMap::new()),
            disconnected: AtomicBool::new(false),
            config,
        });

        let raw = session.request(Method::GetGlobalScope, None, Vec::new())?;
        let scope = session.build_scope(raw)?;
        tracing::info!(bindings = scope.len(), "Fetched remote global scope");

        Ok(Communicator {
            session,
            scope: Arc::new(scope),
        })
    }

    pub fn config(&self) -> &CommunicatorConfig {
        &self.session.config
    }

    pub fn global_scope(&self) -> &ProxyScope {
        &self.scope
    }

    /// Looks `name` up in the global scope, falling back to constructing a
    /// remote class of that name.
    pub fn resolve(&self, name: &str) -> Result<RemoteValue, RpcError> {
        if let Ok(value) = self.scope.get(name) {
            return Ok(value.clone());
        }
        match self.new_instance(name)? {
            RemoteValue::Remote(object) => Ok(RemoteValue::Remote(object)),
            RemoteValue::Json(value) => Err(RpcError::with_data(
                ErrorCode::NoSuchAttribute,
                format!("'{}' is neither a global binding nor a constructible class", name),
                value,
            )),
        }
    }

    /// Invokes `target`, as a method of `parent` when given, otherwise as a
    /// free function of the global scope.
    pub fn call(
        &self,
        target: &RemoteObject,
        args: Vec<Arg>,
        parent: Option<&RemoteObject>,
    ) -> Result<RemoteValue, RpcError> {
        self.session.call(target, args, parent)
    }

    /// Reads `name` from `target` without checking its declared surface.
    pub fn get(&self, target: &RemoteObject, name: &str) -> Result<RemoteValue, RpcError> {
        self.session.get(target, name)
    }

    pub fn get_index(&self, target: &RemoteObject, index: usize) -> Result<RemoteValue, RpcError> {
        self.session.get_index(target, index)
    }

    pub fn set(
        &self,
        target: &RemoteObject,
        name: &str,
        value: impl Into<RemoteValue>,
    ) -> Result<RemoteValue, RpcError> {
        self.session.set(target, name, &value.into())
    }

    pub fn new_instance(&self, class_name: &str) -> Result<RemoteValue, RpcError> {
        let raw = self.session.request(
            Method::New,
            None,
            vec![Value::String(class_name.to_string())],
        )?;
        self.session.wrap(raw, ProxyKind::Instance, None)
    }

    pub fn eval(&self, expression: &str) -> Result<RemoteValue, RpcError> {
        let raw = self.session.request(
            Method::Eval,
            None,
            vec![Value::String(expression.to_string())],
        )?;
        self.session.wrap(raw, ProxyKind::Callable, None)
    }

    /// Round-trips a liveness probe through the transport.
    pub fn ping(&self, timeout: Duration) -> Result<(), RpcError> {
        let result = self.session.transport.lock().ping(timeout);
        result.map_err(|e| self.session.transport_failed(e))
    }

    /// Pumps the transport for `duration`, dispatching whatever arrives.
    pub fn wait(&self, duration: Duration) -> Result<(), RpcError> {
        let deadline = Deadline::after(duration);
        loop {
            self.session.pump_once(deadline)?;
            if deadline.passed() {
                return Ok(());
            }
        }
    }

    /// Sends a one-way event outside the request/response envelope.
    pub fn emit(&self, event: &str, data: Value) -> Result<(), RpcError> {
        self.session.emit(event, data)
    }

    /// Registers `handler` for inbound `event`. Handlers run on whichever
    /// thread is pumping, after the transport lock is released, so they may
    /// issue RPC calls themselves.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(&Value) -> Result<(), RpcError> + Send + Sync + 'static,
    {
        self.session
            .handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn is_connected(&self) -> bool {
        !self.session.disconnected.load(Ordering::SeqCst)
            && self.session.transport.lock().is_connected()
    }

    pub fn close(&self) -> Result<(), RpcError> {
        let result = self.session.transport.lock().close();
        result.map_err(RpcError::from)
    }

    /// Blocks until the response for `id` is available or `timeout` passes.
    pub fn wait_for_result(&self, id: CallId, timeout: Duration) -> Result<Value, RpcError> {
        self.session.wait_for_result(id, timeout)
    }

    pub fn pending(&self) -> &PendingResults {
        &self.session.pending
    }

    pub fn registry(&self) -> &ProxyRegistry {
        &self.session.registry
    }

    /// Next correlation id that will be allocated.
    pub fn next_call_id(&self) -> CallId {
        CallId::new(self.session.ids.peek_next())
    }
}

/// A point in time to stop waiting at. Timeouts too large for [`Instant`]
/// never expire.
#[derive(Debug, Clone, Copy)]
struct Deadline(Option<Instant>);

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Deadline(Instant::now().checked_add(timeout))
    }

    fn passed(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    fn remaining(&self) -> Duration {
        self.0
            .map_or(Duration::MAX, |at| at.saturating_duration_since(Instant::now()))
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("config", &self.session.config)
            .field("proxies", &self.session.registry.len())
            .field("pending", &self.session.pending.len())
            .finish()
    }
}

impl Session {
    pub(crate) fn call(
        self: &Arc<Self>,
        target: &RemoteObject,
        args: Vec<Arg>,
        parent: Option<&RemoteObject>,
    ) -> Result<RemoteValue, RpcError> {
        let receiver = parent.map_or(Value::Null, |p| Value::from(p.uid().as_u64()));
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(receiver);
        params.extend(prepare_params(&args));

        let raw = self.request(Method::Call, Some(target), params)?;
        self.wrap(raw, ProxyKind::Callable, None)
    }

    pub(crate) fn get(
        self: &Arc<Self>,
        target: &RemoteObject,
        name: &str,
    ) -> Result<RemoteValue, RpcError> {
        let raw = self.request(Method::Get, Some(target), vec![Value::from(name)])?;
        self.wrap(raw, ProxyKind::Callable, Some(target))
    }

    pub(crate) fn get_index(
        self: &Arc<Self>,
        target: &RemoteObject,
        index: usize,
    ) -> Result<RemoteValue, RpcError> {
        let raw = self.request(Method::GetIndex, Some(target), vec![Value::from(index)])?;
        self.wrap(raw, ProxyKind::Callable, None)
    }

    pub(crate) fn set(
        self: &Arc<Self>,
        target: &RemoteObject,
        name: &str,
        value: &RemoteValue,
    ) -> Result<RemoteValue, RpcError> {
        let raw = self.request(
            Method::Set,
            Some(target),
            vec![Value::from(name), value.to_wire()],
        )?;
        self.wrap(raw, ProxyKind::Callable, None)
    }

    /// Sends one request and blocks for its decoded result.
    fn request(
        &self,
        method: Method,
        target: Option<&RemoteObject>,
        params: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let id = self.ids.allocate();
        let params = match target {
            Some(target) => {
                let mut full = Vec::with_capacity(params.len() + 1);
                full.push(Value::String(target.serialized().to_string()));
                full.extend(params);
                full
            }
            None => params,
        };
        let request = Request::new(id, method, params);
        let payload = serde_json::to_value(&request)?;

        if self.config.network_debug {
            tracing::info!(%id, %method, %payload, "Sending RPC request");
        } else {
            tracing::trace!(%id, %method, "Sending RPC request");
        }

        self.emit(channel::EXECUTE_COMMAND, payload)?;
        self.wait_for_result(id, self.config.response_timeout)
    }

    fn wait_for_result(&self, id: CallId, timeout: Duration) -> Result<Value, RpcError> {
        let deadline = Deadline::after(timeout);
        loop {
            if let Some(result) = self.pending.take(id) {
                return Ok(result);
            }
            if deadline.passed() {
                self.pending.abandon(id);
                tracing::warn!(%id, ?timeout, "RPC call timed out");
                return Err(RpcError::timeout(format!(
                    "No response to {} within {:?}",
                    id, timeout
                )));
            }
            if let Err(e) = self.pump_once(deadline) {
                // The response may have been routed just before the close.
                if let Some(result) = self.pending.take(id) {
                    return Ok(result);
                }
                self.pending.abandon(id);
                return Err(e);
            }
        }
    }

    /// Pumps one slice, bounded by the poll interval and `deadline`, then
    /// routes what arrived with the transport lock released.
    fn pump_once(&self, deadline: Deadline) -> Result<(), RpcError> {
        let slice = deadline.remaining().min(self.config.poll_interval);

        let frames = {
            let mut transport = self.transport.lock();
            transport.pump(slice)
        };

        match frames {
            Ok(frames) => {
                for frame in frames {
                    self.route(frame);
                }
                Ok(())
            }
            Err(e) => Err(self.transport_failed(e)),
        }
    }

    fn route(&self, frame: EventFrame) {
        if frame.event == channel::RETURN {
            match decode_response(&frame.data) {
                Ok(response) => {
                    tracing::trace!(id = %response.id, "Received RPC response");
                    self.pending.insert(response.id, response.result);
                }
                Err(e) => {
                    tracing::warn!(error = %e, data = %frame.data, "Dropping malformed response")
                }
            }
        } else {
            self.dispatch(&frame.event, &frame.data);
        }
    }

    fn dispatch(&self, event: &str, data: &Value) {
        let handlers = self.handlers.read().get(event).cloned().unwrap_or_default();
        if handlers.is_empty() {
            tracing::trace!(event, "No handler for inbound event");
            return;
        }
        for handler in handlers {
            if let Err(e) = handler(data) {
                tracing::warn!(event, error = %e, "Event handler failed");
            }
        }
    }

    fn emit(&self, event: &str, data: Value) -> Result<(), RpcError> {
        let result = self.transport.lock().emit(event, data);
        result.map_err(|e| self.transport_failed(e))
    }

    /// Converts a transport failure, raising the local disconnect event the
    /// first time the transport is seen closed.
    fn transport_failed(&self, err: TransportError) -> RpcError {
        if matches!(err, TransportError::ConnectionClosed)
            && !self.disconnected.swap(true, Ordering::SeqCst)
        {
            tracing::warn!("Transport closed");
            self.dispatch(channel::DISCONNECT, &Value::Null);
        }
        RpcError::from(err)
    }

    /// Turns a decoded result into a proxy when it is an object descriptor.
    fn wrap(
        self: &Arc<Self>,
        value: Value,
        kind: ProxyKind,
        parent: Option<&RemoteObject>,
    ) -> Result<RemoteValue, RpcError> {
        if !is_handle(&value) {
            return Ok(RemoteValue::Json(value));
        }
        let handle = match RemoteHandle::parse(&value) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "Treating unparsable descriptor as plain data");
                return Ok(RemoteValue::Json(value));
            }
        };

        let session = Arc::downgrade(self);
        let object = self.registry.get_or_create(handle, |handle| {
            RemoteObject::new(handle, kind, parent.cloned(), session)
        });
        Ok(RemoteValue::Remote(object))
    }

    fn build_scope(self: &Arc<Self>, raw: Value) -> Result<ProxyScope, RpcError> {
        let Value::Object(entries) = raw else {
            return Err(RpcError::bad_request(format!(
                "Unable to interpret global scope: {}",
                raw
            )));
        };
        let mut bindings = IndexMap::with_capacity(entries.len());
        for (name, item) in entries {
            let value = self.wrap(item, ProxyKind::Callable, None)?;
            bindings.insert(name, value);
        }
        Ok(ProxyScope::new(bindings))
    }
}
