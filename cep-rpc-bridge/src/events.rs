//! Domain payloads exchanged with the panel and the signals the bridge
//! raises for its owner.
//!
//! Inbound events are decoded on whichever thread happens to be pumping the
//! transport, then handed to subscribers over channels so the owner can
//! react on its own thread.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Log,
    Warn,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_tracing(&self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info | LogLevel::Log => tracing::Level::INFO,
            LogLevel::Warn | LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// A log record written by the panel's JavaScript side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDocument {
    #[serde(default)]
    pub active_document_path: Option<String>,
}

impl ActiveDocument {
    /// The document path, or `None` for an unsaved document or no document.
    pub fn path(&self) -> Option<PathBuf> {
        self.active_document_path
            .as_deref()
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }
}

/// One entry of the panel's command menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub id: i64,
    pub display_name: String,
    pub icon_path: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDisplay {
    pub display: String,
}

impl ContextDisplay {
    pub fn new(display: impl Into<String>) -> Self {
        Self {
            display: display.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelState {
    pub context: ContextDisplay,
    pub commands: Vec<CommandDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextThumbnail {
    pub thumb_path: String,
}

/// Signals raised by a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Log(LogMessage),
    /// The panel asked for the command with this id to run.
    CommandTriggered(i64),
    RunTests,
    /// The panel wants the current state resent.
    StateRequested,
    ActiveDocumentChanged(Option<PathBuf>),
    /// Raised exactly once; the bridge is unusable afterwards.
    Disconnected,
}

/// Fans events out to every live subscriber.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<BridgeEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<BridgeEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Delivers `event` to every subscriber, forgetting those whose receiver
    /// was dropped. Returns how many received it.
    pub fn publish(&self, event: BridgeEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cep_rpc_core::{decode_payload, encode_payload};
    use serde_json::json;

    #[test]
    fn test_log_message_levels() {
        let msg: LogMessage =
            decode_payload(&json!(r#"{"level": "warning", "message": "low disk"}"#)).unwrap();
        assert_eq!(msg.level, LogLevel::Warning);
        assert_eq!(msg.level.as_tracing(), tracing::Level::WARN);
        assert_eq!(LogLevel::Log.as_tracing(), tracing::Level::INFO);

        assert!(decode_payload::<LogMessage>(&json!({"level": "loud", "message": "x"})).is_err());
    }

    #[test]
    fn test_active_document_path() {
        let doc: ActiveDocument =
            decode_payload(&json!({"active_document_path": "/tmp/a.psd"})).unwrap();
        assert_eq!(doc.path(), Some(PathBuf::from("/tmp/a.psd")));

        let unsaved: ActiveDocument = decode_payload(&json!({"active_document_path": ""})).unwrap();
        assert_eq!(unsaved.path(), None);

        let missing: ActiveDocument = decode_payload(&json!("{}")).unwrap();
        assert_eq!(missing.path(), None);
    }

    #[test]
    fn test_panel_state_wire_shape() {
        let state = PanelState {
            context: ContextDisplay::new("Project Foo, Shot 010"),
            commands: vec![CommandDescriptor {
                id: 3,
                display_name: "Publish...".into(),
                icon_path: None,
                description: Some("Publish the document".into()),
            }],
        };

        let encoded = encode_payload(&state).unwrap();
        let text = encoded.as_str().unwrap();
        let value: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(
            value,
            json!({
                "context": {"display": "Project Foo, Shot 010"},
                "commands": [{
                    "id": 3,
                    "display_name": "Publish...",
                    "icon_path": null,
                    "description": "Publish the document",
                }],
            })
        );
    }

    #[test]
    fn test_bus_fans_out_and_prunes() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        assert_eq!(bus.publish(BridgeEvent::RunTests), 2);
        assert_eq!(first.try_recv().unwrap(), BridgeEvent::RunTests);
        assert_eq!(second.try_recv().unwrap(), BridgeEvent::RunTests);

        drop(second);
        assert_eq!(bus.publish(BridgeEvent::StateRequested), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(first.try_recv().unwrap(), BridgeEvent::StateRequested);
    }
}
