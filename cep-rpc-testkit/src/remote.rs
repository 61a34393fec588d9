//! A scripted stand-in for the panel, running on its own thread.

use crate::fixtures::HostModel;
use cep_rpc_core::{channel, decode_request, encode_response, Request};
use cep_rpc_transport::{pair, EventFrame, MemoryPeer, MemoryTransport};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Decides what the fake panel answers. `None` leaves the request
/// unanswered.
pub trait Responder: Send + 'static {
    fn respond(&mut self, request: &Request) -> Option<Value>;
}

impl<F> Responder for F
where
    F: FnMut(&Request) -> Option<Value> + Send + 'static,
{
    fn respond(&mut self, request: &Request) -> Option<Value> {
        self(request)
    }
}

impl Responder for HostModel {
    fn respond(&mut self, request: &Request) -> Option<Value> {
        Some(HostModel::respond(self, request))
    }
}

/// Shared handle to a [`HostModel`] that tests can inspect while the fake
/// panel keeps serving it.
impl Responder for Arc<Mutex<HostModel>> {
    fn respond(&mut self, request: &Request) -> Option<Value> {
        Some(self.lock().respond(request))
    }
}

#[derive(Debug, Default)]
struct Recorded {
    requests: Vec<Request>,
    events: Vec<EventFrame>,
}

#[derive(Debug)]
pub struct FakeRemote {
    peer: MemoryPeer,
    recorded: Arc<Mutex<Recorded>>,
    silent: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FakeRemote {
    /// Starts serving `responder` and returns the transport the
    /// communicator under test should own.
    pub fn spawn<R: Responder>(mut responder: R) -> (MemoryTransport, FakeRemote) {
        let (transport, peer) = pair();
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let silent = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let peer = peer.clone();
            let recorded = recorded.clone();
            let silent = silent.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let Some(frame) = peer.recv_timeout(Duration::from_millis(5)) else {
                        continue;
                    };
                    if frame.event != channel::EXECUTE_COMMAND {
                        recorded.lock().events.push(frame);
                        continue;
                    }

                    let request = match decode_request(&frame.data) {
                        Ok(request) => request,
                        Err(e) => {
                            tracing::warn!(error = %e, "Fake remote got a malformed request");
                            continue;
                        }
                    };
                    recorded.lock().requests.push(request.clone());
                    if silent.load(Ordering::SeqCst) {
                        continue;
                    }

                    let Some(result) = responder.respond(&request) else {
                        continue;
                    };
                    let Ok(envelope) = encode_response(request.id, &result) else {
                        continue;
                    };
                    // The panel sends the envelope as JSON text.
                    if !peer.emit(channel::RETURN, Value::String(envelope.to_string())) {
                        break;
                    }
                }
            })
        };

        let remote = FakeRemote {
            peer,
            recorded,
            silent,
            stop,
            worker: Some(worker),
        };
        (transport, remote)
    }

    pub fn with_host(model: HostModel) -> (MemoryTransport, FakeRemote) {
        Self::spawn(model)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.recorded.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.recorded.lock().requests.len()
    }

    /// One-way events the local side emitted.
    pub fn events(&self) -> Vec<EventFrame> {
        self.recorded.lock().events.clone()
    }

    pub fn emit_event(&self, event: &str, data: Value) -> bool {
        self.peer.emit(event, data)
    }

    /// Sends a raw `return` frame, bypassing the responder.
    pub fn send_return(&self, data: Value) -> bool {
        self.peer.emit(channel::RETURN, data)
    }

    /// While silent, requests are recorded but never answered.
    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    pub fn set_responsive(&self, responsive: bool) {
        self.peer.set_responsive(responsive);
    }

    pub fn ping_count(&self) -> u64 {
        self.peer.ping_count()
    }

    pub fn disconnect(&self) {
        self.peer.disconnect();
    }

    /// Polls until at least `count` requests were recorded.
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.request_count() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        self.request_count() >= count
    }

    /// Polls until an event named `name` was recorded and returns the first.
    pub fn wait_for_event(&self, name: &str, timeout: Duration) -> Option<EventFrame> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self
                .recorded
                .lock()
                .events
                .iter()
                .find(|frame| frame.event == name)
                .cloned()
            {
                return Some(frame);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }
}

impl Drop for FakeRemote {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
