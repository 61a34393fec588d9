use crate::packet::{Packet, SocketPacket};
use crate::threaded::{Inbound, Outbound, ThreadedTransport, WorkerChannels};
use crate::transport::TransportError;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

/// Keepalive period used until the server's handshake says otherwise.
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(25);

/// socket.io client speaking engine.io protocol 3 over a WebSocket.
#[derive(Debug)]
pub struct SocketIoTransport;

impl SocketIoTransport {
    pub fn url(host: &str, port: u16) -> String {
        format!("ws://{host}:{port}/socket.io/?EIO=3&transport=websocket")
    }

    /// Connects and waits for the default namespace to be joined.
    pub fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<ThreadedTransport, TransportError> {
        let url = Self::url(host, port);
        tracing::debug!(%url, "Connecting socket.io transport");
        ThreadedTransport::spawn("socketio", timeout, move |channels| drive(url, channels))
    }
}

async fn drive(url: String, mut channels: WorkerChannels) {
    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            channels.ready(Err(TransportError::Protocol(format!(
                "Failed to connect: {}",
                e
            ))));
            return;
        }
    };
    let (mut sink, mut source) = stream.split();

    let mut keepalive = interval_at(Instant::now() + DEFAULT_PING_INTERVAL, DEFAULT_PING_INTERVAL);
    let mut close_reason: Option<String> = None;

    loop {
        tokio::select! {
            command = channels.outbound.recv() => {
                let packet = match command {
                    Some(Outbound::Event(frame)) => Packet::event(frame),
                    Some(Outbound::Ping) => Packet::Ping(String::new()),
                    Some(Outbound::Close) | None => {
                        if let Ok(text) = Packet::Message(SocketPacket::Disconnect).encode() {
                            let _ = sink.send(WsMessage::text(text)).await;
                        }
                        let _ = sink.close().await;
                        close_reason = Some("closed locally".into());
                        break;
                    }
                };
                if let Err(e) = send_packet(&mut sink, &packet).await {
                    close_reason = Some(e.to_string());
                    break;
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = send_packet(&mut sink, &Packet::Ping(String::new())).await {
                    close_reason = Some(e.to_string());
                    break;
                }
            }
            message = source.next() => {
                let text = match message {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(frame))) => {
                        close_reason = frame.map(|f| f.reason.as_str().to_string());
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        close_reason = Some(format!("WebSocket error: {}", e));
                        break;
                    }
                    None => break,
                };

                let packet = match Packet::decode(text.as_str()) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring undecodable socket.io packet");
                        continue;
                    }
                };

                match packet {
                    Packet::Open(handshake) => {
                        if let Some(ms) = handshake.get("pingInterval").and_then(|v| v.as_u64()) {
                            let period = Duration::from_millis(ms.max(1));
                            keepalive = interval_at(Instant::now() + period, period);
                        }
                        tracing::debug!(%handshake, "engine.io handshake");
                    }
                    Packet::Ping(probe) => {
                        if let Err(e) = send_packet(&mut sink, &Packet::Pong(probe)).await {
                            close_reason = Some(e.to_string());
                            break;
                        }
                    }
                    Packet::Pong(_) => {
                        if !channels.deliver(Inbound::Pong) {
                            break;
                        }
                    }
                    Packet::Message(SocketPacket::Connect) => channels.ready(Ok(())),
                    Packet::Message(SocketPacket::Event { frame, .. }) => {
                        if !channels.deliver(Inbound::Event(frame)) {
                            break;
                        }
                    }
                    Packet::Message(SocketPacket::Error(detail)) => {
                        if channels.is_ready() {
                            tracing::warn!(%detail, "socket.io error packet");
                        } else {
                            channels.ready(Err(TransportError::Protocol(format!(
                                "Server refused connection: {}",
                                detail
                            ))));
                            return;
                        }
                    }
                    Packet::Message(SocketPacket::Disconnect) | Packet::Close => {
                        close_reason = Some("server disconnected".into());
                        break;
                    }
                    Packet::Message(SocketPacket::Ack { .. }) | Packet::Upgrade | Packet::Noop => {}
                }
            }
        }
    }

    // A connection that dies before joining the namespace never became ready.
    channels.ready(Err(TransportError::ConnectionClosed));
    channels.deliver(Inbound::Closed(close_reason));
}

async fn send_packet<S>(sink: &mut S, packet: &Packet) -> Result<(), TransportError>
where
    S: futures::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = packet.encode()?;
    sink.send(WsMessage::text(text))
        .await
        .map_err(|e| TransportError::Protocol(format!("Failed to send WebSocket message: {}", e)))
}
