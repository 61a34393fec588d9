//! The bridge: a communicator plus the panel's domain events.

use crate::commands::CommandRegistry;
use crate::config::{BridgeConfig, ConfigError};
use crate::events::{
    ActiveDocument, BridgeEvent, ContextDisplay, ContextThumbnail, EventBus, LogLevel, LogMessage,
    PanelState,
};
use crate::state::{ConnectionState, Liveness, Transition};
use cep_rpc_client::{Communicator, RemoteValue};
use cep_rpc_core::{channel, decode_payload, encode_payload, RpcError};
use cep_rpc_transport::{Transport, TransportError};
use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How long a heartbeat pumps for queued events after a successful ping.
pub const HEARTBEAT_DRAIN: Duration = Duration::from_millis(10);

/// Target inbound panel log records are forwarded under.
pub const PANEL_LOG_TARGET: &str = "adobe";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Bridge {0} is disconnected")]
    Disconnected(String),
}

impl BridgeError {
    pub fn is_timeout(&self) -> bool {
        match self {
            BridgeError::Rpc(e) => e.is_timeout(),
            BridgeError::Transport(e) => matches!(e, TransportError::Timeout(_)),
            _ => false,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        match self {
            BridgeError::Rpc(e) => e.is_disconnected(),
            BridgeError::Transport(e) => matches!(e, TransportError::ConnectionClosed),
            BridgeError::Disconnected(_) => true,
            BridgeError::Config(_) => false,
        }
    }
}

/// State the inbound handlers need. Kept apart from the communicator so the
/// handlers the communicator owns never point back at it.
#[derive(Debug)]
struct Shared {
    identifier: String,
    events: EventBus,
    liveness: Liveness,
}

impl Shared {
    fn apply(&self, transition: Transition) {
        if transition.disconnected() {
            tracing::warn!(identifier = %self.identifier, "Bridge disconnected");
            self.events.publish(BridgeEvent::Disconnected);
        }
    }
}

/// One connection to a panel.
///
/// Clones share the connection. Inbound events are raised on whichever
/// thread is pumping (an RPC call, [`Bridge::wait`] or the heartbeat) and
/// delivered to subscribers over channels.
#[derive(Clone)]
pub struct Bridge {
    communicator: Communicator,
    commands: Arc<CommandRegistry>,
    config: Arc<BridgeConfig>,
    shared: Arc<Shared>,
}

impl Bridge {
    /// Connects over `transport`, fetches the global scope and subscribes to
    /// the panel's events.
    pub fn connect<T>(
        identifier: impl Into<String>,
        transport: T,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError>
    where
        T: Transport + 'static,
    {
        let shared = Arc::new(Shared {
            identifier: identifier.into(),
            events: EventBus::new(),
            liveness: Liveness::new(config.heartbeat_tolerance),
        });
        tracing::info!(
            identifier = %shared.identifier,
            state = %shared.liveness.state(),
            "Connecting bridge"
        );

        let communicator = Communicator::connect(transport, config.communicator_config())?;
        subscribe(&communicator, &shared);
        shared.liveness.mark_ready();

        tracing::info!(
            identifier = %shared.identifier,
            globals = communicator.global_scope().len(),
            "Bridge ready"
        );
        Ok(Self {
            communicator,
            commands: Arc::new(CommandRegistry::new()),
            config: Arc::new(config),
            shared,
        })
    }

    /// Connects to the panel's socket.io server at the configured host and
    /// port.
    #[cfg(feature = "socketio")]
    pub fn connect_socketio(
        identifier: impl Into<String>,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let port = config.port()?;
        let transport = cep_rpc_transport::SocketIoTransport::connect(
            &config.host,
            port,
            config.response_timeout.min(Duration::from_secs(30)),
        )?;
        Self::connect(identifier, transport, config)
    }

    pub fn identifier(&self) -> &str {
        &self.shared.identifier
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn communicator(&self) -> &Communicator {
        &self.communicator
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.liveness.state()
    }

    pub fn is_disconnected(&self) -> bool {
        self.shared.liveness.is_disconnected()
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.shared.liveness.last_heartbeat()
    }

    pub fn subscribe(&self) -> Receiver<BridgeEvent> {
        self.shared.events.subscribe()
    }

    /// Looks up a global binding, such as `app`.
    pub fn resolve(&self, name: &str) -> Result<RemoteValue, BridgeError> {
        self.ensure_connected()?;
        Ok(self.communicator.resolve(name)?)
    }

    /// Pings with the heartbeat timeout as its bound.
    pub fn ping(&self) -> Result<(), BridgeError> {
        self.ensure_connected()?;
        self.communicator
            .ping(self.config.heartbeat_timeout)
            .map_err(|e| self.failed(e))
    }

    /// Pumps inbound events for `duration`. Waits longer than the response
    /// timeout are cut short and reported as a timeout.
    pub fn wait(&self, duration: Duration) -> Result<(), BridgeError> {
        self.ensure_connected()?;
        let bound = self.config.response_timeout;
        self.communicator
            .wait(duration.min(bound))
            .map_err(|e| self.failed(e))?;
        if duration > bound {
            return Err(RpcError::timeout(format!(
                "Wait of {:?} exceeds the response timeout of {:?}",
                duration, bound
            ))
            .into());
        }
        Ok(())
    }

    /// One liveness check: a guarded ping followed by a short drain of
    /// queued events. Failures are counted rather than returned, and the
    /// failure that exceeds the tolerance raises [`BridgeEvent::Disconnected`].
    pub fn heartbeat(&self) -> ConnectionState {
        if self.is_disconnected() {
            return ConnectionState::Disconnected;
        }

        let outcome = self.ping().and_then(|()| self.wait(HEARTBEAT_DRAIN));
        let transition = match outcome {
            Ok(()) => self.shared.liveness.record_success(),
            Err(e) if e.is_disconnected() => self.shared.liveness.mark_disconnected(),
            Err(e) => {
                let transition = self.shared.liveness.record_failure();
                tracing::warn!(
                    identifier = %self.shared.identifier,
                    error = %e,
                    failures = self.shared.liveness.consecutive_failures(),
                    tolerance = self.shared.liveness.tolerance(),
                    "Heartbeat failed"
                );
                transition
            }
        };
        self.shared.apply(transition);
        transition.to
    }

    /// Sends the context display and the registered commands.
    pub fn send_state(&self, context: ContextDisplay) -> Result<(), BridgeError> {
        let state = PanelState {
            context,
            commands: self.commands.descriptors(),
        };
        tracing::debug!(?state, "Sending state");
        self.send(channel::SET_STATE, &state)
    }

    pub fn send_commands(&self) -> Result<(), BridgeError> {
        self.send(channel::SET_COMMANDS, &self.commands.descriptors())
    }

    pub fn send_context_display(&self, context: &ContextDisplay) -> Result<(), BridgeError> {
        self.send(channel::SET_CONTEXT_DISPLAY, context)
    }

    pub fn send_context_thumbnail(&self, thumbnail: &ContextThumbnail) -> Result<(), BridgeError> {
        self.send(channel::SET_CONTEXT_THUMBNAIL, thumbnail)
    }

    /// Tells the panel to clear its context while a new one is loaded.
    pub fn context_about_to_change(&self) -> Result<(), BridgeError> {
        self.ensure_connected()?;
        self.communicator
            .emit(channel::CONTEXT_ABOUT_TO_CHANGE, Value::Null)
            .map_err(|e| self.failed(e))
    }

    /// Runs the command with `id`, as asked for by
    /// [`BridgeEvent::CommandTriggered`].
    pub fn run_command(&self, id: i64) -> Result<(), crate::commands::CommandError> {
        self.commands.invoke(id)
    }

    pub fn close(&self) -> Result<(), BridgeError> {
        let result = self.communicator.close();
        self.shared.apply(self.shared.liveness.mark_disconnected());
        Ok(result?)
    }

    fn send<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> Result<(), BridgeError> {
        self.ensure_connected()?;
        let data = encode_payload(&payload)?;
        self.communicator
            .emit(event, data)
            .map_err(|e| self.failed(e))
    }

    fn ensure_connected(&self) -> Result<(), BridgeError> {
        if self.is_disconnected() {
            Err(BridgeError::Disconnected(self.shared.identifier.clone()))
        } else {
            Ok(())
        }
    }

    fn failed(&self, err: RpcError) -> BridgeError {
        if err.is_disconnected() {
            self.shared.apply(self.shared.liveness.mark_disconnected());
        }
        err.into()
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("identifier", &self.shared.identifier)
            .field("state", &self.shared.liveness.state())
            .field("commands", &self.commands.len())
            .finish()
    }
}

/// Wires the panel's inbound channels to the event bus.
fn subscribe(communicator: &Communicator, shared: &Arc<Shared>) {
    let s = shared.clone();
    communicator.on(channel::LOGGING, move |data| {
        let message: LogMessage = decode_payload(data)?;
        forward_log(&message);
        s.events.publish(BridgeEvent::Log(message));
        Ok(())
    });

    let s = shared.clone();
    communicator.on(channel::COMMAND, move |data| {
        let id: i64 = decode_payload(data)?;
        tracing::debug!(id, "Panel triggered command");
        s.events.publish(BridgeEvent::CommandTriggered(id));
        Ok(())
    });

    let s = shared.clone();
    communicator.on(channel::RUN_TESTS, move |_| {
        s.events.publish(BridgeEvent::RunTests);
        Ok(())
    });

    let s = shared.clone();
    communicator.on(channel::STATE_REQUESTED, move |_| {
        s.events.publish(BridgeEvent::StateRequested);
        Ok(())
    });

    let s = shared.clone();
    communicator.on(channel::ACTIVE_DOCUMENT_CHANGED, move |data| {
        let document: ActiveDocument = decode_payload(data)?;
        tracing::debug!(path = ?document.path(), "Active document changed");
        s.events
            .publish(BridgeEvent::ActiveDocumentChanged(document.path()));
        Ok(())
    });

    let s = shared.clone();
    communicator.on(channel::DISCONNECT, move |_| {
        s.apply(s.liveness.mark_disconnected());
        Ok(())
    });
}

fn forward_log(message: &LogMessage) {
    let text = message.message.as_str();
    match message.level {
        LogLevel::Debug => tracing::debug!(target: PANEL_LOG_TARGET, "{}", text),
        LogLevel::Info | LogLevel::Log => tracing::info!(target: PANEL_LOG_TARGET, "{}", text),
        LogLevel::Warn | LogLevel::Warning => tracing::warn!(target: PANEL_LOG_TARGET, "{}", text),
        LogLevel::Error => tracing::error!(target: PANEL_LOG_TARGET, "{}", text),
    }
}
