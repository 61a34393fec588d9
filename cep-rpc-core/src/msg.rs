use crate::ids::CallId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

/// Named channels carried by the transport.
pub mod channel {
    /// Outbound RPC requests.
    pub const EXECUTE_COMMAND: &str = "execute_command";
    /// Inbound RPC responses.
    pub const RETURN: &str = "return";
    /// Raised locally, once, when the transport is found closed.
    pub const DISCONNECT: &str = "disconnect";

    pub const LOGGING: &str = "logging";
    pub const COMMAND: &str = "command";
    pub const RUN_TESTS: &str = "run_tests";
    pub const STATE_REQUESTED: &str = "state_requested";
    pub const ACTIVE_DOCUMENT_CHANGED: &str = "active_document_changed";

    pub const SET_STATE: &str = "set_state";
    pub const SET_COMMANDS: &str = "set_commands";
    pub const SET_CONTEXT_DISPLAY: &str = "set_context_display";
    pub const SET_CONTEXT_THUMBNAIL: &str = "set_context_thumbnail";
    pub const CONTEXT_ABOUT_TO_CHANGE: &str = "context_about_to_change";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Call,
    Get,
    Set,
    GetIndex,
    New,
    Eval,
    GetGlobalScope,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Call => "call",
            Method::Get => "get",
            Method::Set => "set",
            Method::GetIndex => "get_index",
            Method::New => "new",
            Method::Eval => "eval",
            Method::GetGlobalScope => "get_global_scope",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-RPC request envelope emitted on [`channel::EXECUTE_COMMAND`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: CallId,
    pub method: Method,
    pub jsonrpc: String,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(id: CallId, method: Method, params: Vec<Value>) -> Self {
        Request {
            id,
            method,
            jsonrpc: JSONRPC_VERSION.to_string(),
            params,
        }
    }
}

/// Response delivered on [`channel::RETURN`], `result` already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: CallId,
    #[serde(default)]
    pub result: Value,
}
