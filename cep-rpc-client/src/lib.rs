//! Remote object proxies and the blocking communicator that drives them.

#[macro_use]
mod macros;

pub mod args;
pub mod communicator;
pub mod pending;
pub mod proxy;
pub mod registry;
pub mod scope;

pub use args::{prepare_params, Arg};
pub use communicator::{Communicator, CommunicatorConfig, EventHandler};
pub use pending::PendingResults;
pub use proxy::{Assignment, ProxyKind, RemoteObject, RemoteValue};
pub use registry::ProxyRegistry;
pub use scope::ProxyScope;
