use cep_rpc_core::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed => RpcError::disconnected(err.to_string()),
            TransportError::Timeout(_) => RpcError::timeout(err.to_string()),
            other => RpcError::transport(other.to_string()),
        }
    }
}

/// A named event with its payload, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        EventFrame {
            event: event.into(),
            data,
        }
    }
}

/// A persistent, bidirectional named-event channel.
///
/// All operations block the calling thread; `pump` is the only way
/// inbound frames are observed.
pub trait Transport: Send {
    /// Queues `data` for delivery under the `event` name.
    fn emit(&mut self, event: &str, data: Value) -> Result<(), TransportError>;

    /// Waits up to `timeout` for the first inbound frame, then drains
    /// whatever else is already queued. An empty vec means nothing arrived.
    fn pump(&mut self, timeout: Duration) -> Result<Vec<EventFrame>, TransportError>;

    /// Round-trips a liveness probe, failing with `Timeout` if the peer
    /// does not answer within `timeout`.
    fn ping(&mut self, timeout: Duration) -> Result<(), TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn emit(&mut self, event: &str, data: Value) -> Result<(), TransportError> {
        (**self).emit(event, data)
    }

    fn pump(&mut self, timeout: Duration) -> Result<Vec<EventFrame>, TransportError> {
        (**self).pump(timeout)
    }

    fn ping(&mut self, timeout: Duration) -> Result<(), TransportError> {
        (**self).ping(timeout)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
