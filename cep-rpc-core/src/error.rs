use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    NoSuchAttribute,
    Timeout,
    Disconnected,
    Transport,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::NoSuchAttribute => "no_such_attribute",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Disconnected => "disconnected",
            ErrorCode::Transport => "transport",
            ErrorCode::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: Value) -> Self {
        RpcError {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// A proxy was asked for a name outside its declared surface.
    pub fn no_such_attribute(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::with_data(
            ErrorCode::NoSuchAttribute,
            format!("Attribute {} does not exist", name),
            Value::String(name),
        )
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Disconnected, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transport, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    pub fn is_disconnected(&self) -> bool {
        self.code == ErrorCode::Disconnected
    }

    pub fn is_no_such_attribute(&self) -> bool {
        self.code == ErrorCode::NoSuchAttribute
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::bad_request(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::internal(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convenience_constructors() {
        assert_eq!(RpcError::bad_request("x").code, ErrorCode::BadRequest);
        assert_eq!(RpcError::timeout("x").code, ErrorCode::Timeout);
        assert_eq!(RpcError::disconnected("x").code, ErrorCode::Disconnected);
        assert_eq!(RpcError::transport("x").code, ErrorCode::Transport);
        assert_eq!(RpcError::internal("x").code, ErrorCode::Internal);
    }

    #[test]
    fn test_no_such_attribute_carries_name() {
        let err = RpcError::no_such_attribute("visible");
        assert!(err.is_no_such_attribute());
        assert!(!err.is_timeout());
        assert_eq!(err.data, Some(Value::String("visible".to_string())));
        assert!(err.to_string().contains("visible"));
    }

    #[test]
    fn test_error_serialization() {
        let err = RpcError::timeout("no response for CallId(3)");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"timeout\""));
        assert!(!json.contains("\"data\""));
        let deserialized: RpcError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }

    #[test]
    fn test_json_error_is_bad_request() {
        let err: RpcError = serde_json::from_str::<Value>("{oops").unwrap_err().into();
        assert_eq!(err.code, ErrorCode::BadRequest);
        assert!(err.message.starts_with("JSON error"));
    }
}
