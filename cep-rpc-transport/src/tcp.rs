use crate::codec::EventLineCodec;
use crate::threaded::{Inbound, Outbound, ThreadedTransport, WorkerChannels};
use crate::transport::{EventFrame, TransportError};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Event names reserved for liveness probes on the line protocol.
pub const PING_EVENT: &str = "ping";
pub const PONG_EVENT: &str = "pong";

/// Newline-delimited JSON events over a plain TCP stream.
///
/// Used by panels that talk to the bridge without socket.io, and by the
/// test harness. Liveness probes are ordinary `ping`/`pong` events.
#[derive(Debug)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn connect(
        addr: SocketAddr,
        timeout: Duration,
    ) -> Result<ThreadedTransport, TransportError> {
        tracing::debug!(%addr, "Connecting TCP transport");
        ThreadedTransport::spawn("tcp", timeout, move |channels| drive(addr, channels))
    }
}

async fn drive(addr: SocketAddr, mut channels: WorkerChannels) {
    let stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(e) => {
            channels.ready(Err(TransportError::Io(e)));
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    let mut framed = Framed::new(stream, EventLineCodec::new());
    channels.ready(Ok(()));

    let close_reason = loop {
        tokio::select! {
            command = channels.outbound.recv() => {
                let frame = match command {
                    Some(Outbound::Event(frame)) => frame,
                    Some(Outbound::Ping) => EventFrame::new(PING_EVENT, Value::Null),
                    Some(Outbound::Close) | None => {
                        let _ = framed.close().await;
                        break Some("closed locally".to_string());
                    }
                };
                if let Err(e) = framed.send(frame).await {
                    break Some(e.to_string());
                }
            }
            incoming = framed.next() => match incoming {
                Some(Ok(frame)) if frame.event == PING_EVENT => {
                    if let Err(e) = framed.send(EventFrame::new(PONG_EVENT, frame.data)).await {
                        break Some(e.to_string());
                    }
                }
                Some(Ok(frame)) if frame.event == PONG_EVENT => {
                    if !channels.deliver(Inbound::Pong) {
                        break None;
                    }
                }
                Some(Ok(frame)) => {
                    if !channels.deliver(Inbound::Event(frame)) {
                        break None;
                    }
                }
                Some(Err(e)) => break Some(e.to_string()),
                None => break Some("peer closed the stream".to_string()),
            }
        }
    };

    channels.deliver(Inbound::Closed(close_reason));
}
