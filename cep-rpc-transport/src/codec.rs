use crate::transport::{EventFrame, TransportError};
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Newline-delimited JSON codec for `{"event": .., "data": ..}` frames.
#[derive(Debug)]
pub struct EventLineCodec {
    max_line_length: usize,
}

impl EventLineCodec {
    pub fn new() -> Self {
        Self {
            max_line_length: 16 * 1024 * 1024, // 16MB default, global scopes can be large
        }
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self { max_line_length }
    }
}

impl Default for EventLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EventLineCodec {
    type Item = EventFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > self.max_line_length {
                    return Err(CodecError::LineTooLong(src.len()));
                }
                return Ok(None);
            };

            if pos > self.max_line_length {
                return Err(CodecError::LineTooLong(pos));
            }

            let line = src.split_to(pos);
            src.advance(1);

            // Tolerate CRLF and blank keep-alive lines.
            let line = trim_ascii(&line);
            if line.is_empty() {
                continue;
            }

            let frame: EventFrame =
                serde_json::from_slice(line).map_err(|e| CodecError::JsonError(e.to_string()))?;
            return Ok(Some(frame));
        }
    }
}

impl Encoder<EventFrame> for EventLineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: EventFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json_bytes =
            serde_json::to_vec(&item).map_err(|e| CodecError::JsonError(e.to_string()))?;

        if json_bytes.len() > self.max_line_length {
            return Err(CodecError::LineTooLong(json_bytes.len()));
        }

        dst.reserve(json_bytes.len() + 1);
        dst.put_slice(&json_bytes);
        dst.put_u8(b'\n');

        Ok(())
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &bytes[start..end]
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Line too long: {0} bytes")]
    LineTooLong(usize),

    #[error("JSON error: {0}")]
    JsonError(String),

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::IoError(e) => TransportError::Io(e),
            other => TransportError::Codec(other.to_string()),
        }
    }
}
