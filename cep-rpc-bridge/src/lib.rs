//! Connects a host process to an Adobe CEP panel: blocking RPC into the
//! panel's scripting runtime, the panel's domain events, and a heartbeat
//! that tells the owner when the panel has gone away.

pub mod arena;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod events;
pub mod heartbeat;
pub mod logging;
pub mod state;

pub use arena::BridgeArena;
pub use bridge::{Bridge, BridgeError, HEARTBEAT_DRAIN, PANEL_LOG_TARGET};
pub use commands::{CommandCallback, CommandError, CommandProperties, CommandRegistry};
pub use config::{BridgeConfig, ConfigError};
pub use events::{
    ActiveDocument, BridgeEvent, CommandDescriptor, ContextDisplay, ContextThumbnail, EventBus,
    LogLevel, LogMessage, PanelState,
};
pub use heartbeat::HeartbeatMonitor;
pub use logging::{init_logging, init_test_logging, LogSettings};
pub use state::{ConnectionState, Liveness, Transition};

pub use cep_rpc_client::{Arg, Communicator, RemoteObject, RemoteValue};
