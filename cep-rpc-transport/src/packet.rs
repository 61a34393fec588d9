//! Text framing for socket.io v2 (engine.io protocol 3), the dialect spoken
//! by the panel's bundled socket.io server.
//!
//! An engine.io packet is a single type digit followed by its payload. The
//! `4` (message) type wraps a socket.io packet, which is again a type digit
//! followed by an optional namespace, an optional ack id and a JSON body.

use crate::codec::CodecError;
use crate::transport::EventFrame;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Handshake sent by the server when the connection opens.
    Open(Value),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect,
    Disconnect,
    Event { ack: Option<u64>, frame: EventFrame },
    Ack { ack: u64, data: Vec<Value> },
    Error(Value),
}

impl Packet {
    pub fn event(frame: EventFrame) -> Self {
        Packet::Message(SocketPacket::Event { ack: None, frame })
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        let text = match self {
            Packet::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).map_err(json_err)?)
            }
            Packet::Close => "1".to_string(),
            Packet::Ping(probe) => format!("2{probe}"),
            Packet::Pong(probe) => format!("3{probe}"),
            Packet::Message(inner) => format!("4{}", inner.encode()?),
            Packet::Upgrade => "5".to_string(),
            Packet::Noop => "6".to_string(),
        };
        Ok(text)
    }

    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| CodecError::Malformed("empty packet".into()))?;
        let rest = chars.as_str();

        match kind {
            '0' => {
                let handshake = if rest.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(rest).map_err(json_err)?
                };
                Ok(Packet::Open(handshake))
            }
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping(rest.to_string())),
            '3' => Ok(Packet::Pong(rest.to_string())),
            '4' => Ok(Packet::Message(SocketPacket::decode(rest)?)),
            '5' => Ok(Packet::Upgrade),
            '6' => Ok(Packet::Noop),
            other => Err(CodecError::Malformed(format!(
                "unknown engine.io packet type {other:?}"
            ))),
        }
    }
}

impl SocketPacket {
    fn encode(&self) -> Result<String, CodecError> {
        let text = match self {
            SocketPacket::Connect => "0".to_string(),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { ack, frame } => {
                let mut body = vec![Value::String(frame.event.clone())];
                if !frame.data.is_null() {
                    body.push(frame.data.clone());
                }
                format!(
                    "2{}{}",
                    ack.map(|id| id.to_string()).unwrap_or_default(),
                    serde_json::to_string(&body).map_err(json_err)?
                )
            }
            SocketPacket::Ack { ack, data } => {
                format!("3{ack}{}", serde_json::to_string(data).map_err(json_err)?)
            }
            SocketPacket::Error(detail) => {
                format!("4{}", serde_json::to_string(detail).map_err(json_err)?)
            }
        };
        Ok(text)
    }

    fn decode(text: &str) -> Result<Self, CodecError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| CodecError::Malformed("empty socket.io packet".into()))?;
        let (ack, body) = split_header(chars.as_str());

        match kind {
            '0' => Ok(SocketPacket::Connect),
            '1' => Ok(SocketPacket::Disconnect),
            '2' | '5' => {
                let args: Vec<Value> = serde_json::from_str(body).map_err(json_err)?;
                let mut args = args.into_iter();
                let event = match args.next() {
                    Some(Value::String(name)) => name,
                    _ => {
                        return Err(CodecError::Malformed(
                            "event packet without a string name".into(),
                        ))
                    }
                };
                let rest: Vec<Value> = args.collect();
                let data = match rest.len() {
                    0 => Value::Null,
                    1 => rest.into_iter().next().unwrap_or(Value::Null),
                    _ => Value::Array(rest),
                };
                Ok(SocketPacket::Event {
                    ack,
                    frame: EventFrame::new(event, data),
                })
            }
            '3' | '6' => {
                let ack = ack.ok_or_else(|| CodecError::Malformed("ack without an id".into()))?;
                let data = serde_json::from_str(body).map_err(json_err)?;
                Ok(SocketPacket::Ack { ack, data })
            }
            '4' => {
                let detail = if body.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
                };
                Ok(SocketPacket::Error(detail))
            }
            other => Err(CodecError::Malformed(format!(
                "unknown socket.io packet type {other:?}"
            ))),
        }
    }
}

/// Strips the optional `/namespace,` prefix and the optional numeric ack id
/// from the front of a socket.io packet body.
fn split_header(text: &str) -> (Option<u64>, &str) {
    let mut rest = text;

    // Binary attachments count ("1-") is never produced by the panel but
    // tolerated so the frame can still be routed.
    if let Some(dash) = rest.find('-') {
        if dash > 0 && rest[..dash].bytes().all(|b| b.is_ascii_digit()) {
            rest = &rest[dash + 1..];
        }
    }

    if rest.starts_with('/') {
        rest = match rest.find(',') {
            Some(comma) => &rest[comma + 1..],
            None => "",
        };
    }

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack = if digits > 0 {
        rest[..digits].parse().ok()
    } else {
        None
    };
    (ack, &rest[digits..])
}

fn json_err(err: serde_json::Error) -> CodecError {
    CodecError::JsonError(err.to_string())
}
