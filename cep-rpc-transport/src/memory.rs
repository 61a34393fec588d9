//! In-process transport pair.
//!
//! `MemoryTransport` is the local end handed to a communicator;
//! `MemoryPeer` plays the panel. Pings are answered by the shared state
//! rather than by the peer's thread so tests stay deterministic.

use crate::threaded::Inbound;
use crate::transport::{EventFrame, Transport, TransportError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct PeerState {
    responsive: AtomicBool,
    open: AtomicBool,
    pings: AtomicU64,
}

pub fn pair() -> (MemoryTransport, MemoryPeer) {
    let (to_peer, from_local) = crossbeam_channel::unbounded();
    let (to_local, from_peer) = crossbeam_channel::unbounded();
    let state = Arc::new(PeerState {
        responsive: AtomicBool::new(true),
        open: AtomicBool::new(true),
        pings: AtomicU64::new(0),
    });

    let transport = MemoryTransport {
        outgoing: to_peer,
        incoming: from_peer,
        state: state.clone(),
        connected: true,
    };
    let peer = MemoryPeer {
        incoming: from_local,
        outgoing: to_local,
        state,
    };
    (transport, peer)
}

#[derive(Debug)]
pub struct MemoryTransport {
    outgoing: Sender<EventFrame>,
    incoming: Receiver<Inbound>,
    state: Arc<PeerState>,
    connected: bool,
}

impl MemoryTransport {
    fn accept(&mut self, item: Inbound, frames: &mut Vec<EventFrame>) {
        match item {
            Inbound::Event(frame) => frames.push(frame),
            Inbound::Pong => {}
            Inbound::Closed(reason) => {
                tracing::debug!(reason = reason.as_deref().unwrap_or(""), "Memory peer closed");
                self.connected = false;
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn emit(&mut self, event: &str, data: Value) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::ConnectionClosed);
        }
        self.outgoing
            .send(EventFrame::new(event, data))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn pump(&mut self, timeout: Duration) -> Result<Vec<EventFrame>, TransportError> {
        if !self.connected {
            return Err(TransportError::ConnectionClosed);
        }

        let mut frames = Vec::new();
        match self.incoming.recv_timeout(timeout) {
            Ok(item) => self.accept(item, &mut frames),
            Err(RecvTimeoutError::Timeout) => return Ok(frames),
            Err(RecvTimeoutError::Disconnected) => self.connected = false,
        }
        while self.connected {
            match self.incoming.try_recv() {
                Ok(item) => self.accept(item, &mut frames),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.connected = false,
            }
        }

        if frames.is_empty() && !self.connected {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(frames)
    }

    fn ping(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.state.responsive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            thread::sleep(timeout);
            Err(TransportError::Timeout(timeout))
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        self.state.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected && self.state.open.load(Ordering::SeqCst)
    }
}

/// The remote end of a [`pair`].
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    incoming: Receiver<EventFrame>,
    outgoing: Sender<Inbound>,
    state: Arc<PeerState>,
}

impl MemoryPeer {
    /// Sends an event to the local side. Returns false once it is gone.
    pub fn emit(&self, event: &str, data: Value) -> bool {
        self.outgoing
            .send(Inbound::Event(EventFrame::new(event, data)))
            .is_ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EventFrame> {
        self.incoming.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<EventFrame> {
        self.incoming.try_recv().ok()
    }

    /// Controls whether pings from the local side succeed.
    pub fn set_responsive(&self, responsive: bool) {
        self.state.responsive.store(responsive, Ordering::SeqCst);
    }

    pub fn ping_count(&self) -> u64 {
        self.state.pings.load(Ordering::SeqCst)
    }

    pub fn disconnect(&self) {
        self.state.open.store(false, Ordering::SeqCst);
        let _ = self
            .outgoing
            .send(Inbound::Closed(Some("peer disconnected".into())));
    }

    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }
}
