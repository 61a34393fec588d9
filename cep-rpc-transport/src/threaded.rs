//! Blocking handle over an async connection driven on a dedicated thread.
//!
//! The worker thread owns a single-threaded tokio runtime and the socket.
//! The handle talks to it through two queues: commands go out on a tokio
//! mpsc channel, and everything the socket produces comes back on a
//! crossbeam channel so the caller can block with a deadline.

use crate::transport::{EventFrame, Transport, TransportError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Commands sent from the handle to the worker.
#[derive(Debug)]
pub enum Outbound {
    Event(EventFrame),
    Ping,
    Close,
}

/// Everything the worker reports back to the handle.
#[derive(Debug)]
pub enum Inbound {
    Event(EventFrame),
    Pong,
    Closed(Option<String>),
}

/// The worker's half of the queues.
#[derive(Debug)]
pub struct WorkerChannels {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub inbound: Sender<Inbound>,
    ready: Option<Sender<Result<(), TransportError>>>,
}

impl WorkerChannels {
    /// Reports the outcome of connection setup. Only the first report counts.
    pub fn ready(&mut self, result: Result<(), TransportError>) {
        if let Some(tx) = self.ready.take() {
            let _ = tx.send(result);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_none()
    }

    /// Forwards an inbound item, returning false once the handle is gone.
    pub fn deliver(&self, item: Inbound) -> bool {
        self.inbound.send(item).is_ok()
    }
}

#[derive(Debug)]
pub struct ThreadedTransport {
    name: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: Receiver<Inbound>,
    buffered: VecDeque<EventFrame>,
    connected: bool,
}

impl ThreadedTransport {
    /// Starts `worker` on a new thread and blocks until it reports ready,
    /// fails, or `connect_timeout` elapses.
    pub fn spawn<F, Fut>(
        name: &str,
        connect_timeout: Duration,
        worker: F,
    ) -> Result<Self, TransportError>
    where
        F: FnOnce(WorkerChannels) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let channels = WorkerChannels {
            outbound: outbound_rx,
            inbound: inbound_tx,
            ready: Some(ready_tx.clone()),
        };

        thread::Builder::new()
            .name(format!("{name}-transport"))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(TransportError::Io(e)));
                        return;
                    }
                };
                drop(ready_tx);
                runtime.block_on(worker(channels));
            })?;

        match ready_rx.recv_timeout(connect_timeout) {
            Ok(Ok(())) => {
                tracing::info!(transport = name, "Transport connected");
                Ok(Self {
                    name: name.to_string(),
                    outbound: outbound_tx,
                    inbound: inbound_rx,
                    buffered: VecDeque::new(),
                    connected: true,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => {
                let _ = outbound_tx.send(Outbound::Close);
                Err(TransportError::Timeout(connect_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::ConnectionClosed),
        }
    }

    fn mark_closed(&mut self, reason: Option<String>) {
        if self.connected {
            tracing::info!(
                transport = %self.name,
                reason = reason.as_deref().unwrap_or("worker exited"),
                "Transport closed"
            );
        }
        self.connected = false;
    }

    fn accept(&mut self, item: Inbound, frames: &mut Vec<EventFrame>) {
        match item {
            Inbound::Event(frame) => frames.push(frame),
            Inbound::Pong => tracing::trace!(transport = %self.name, "Dropping stale pong"),
            Inbound::Closed(reason) => self.mark_closed(reason),
        }
    }

    fn drain_ready(&mut self, frames: &mut Vec<EventFrame>) {
        while self.connected {
            match self.inbound.try_recv() {
                Ok(item) => self.accept(item, frames),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.mark_closed(None),
            }
        }
    }
}

impl Transport for ThreadedTransport {
    fn emit(&mut self, event: &str, data: Value) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(Outbound::Event(EventFrame::new(event, data)))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn pump(&mut self, timeout: Duration) -> Result<Vec<EventFrame>, TransportError> {
        let mut frames: Vec<EventFrame> = self.buffered.drain(..).collect();

        if frames.is_empty() && self.connected {
            match self.inbound.recv_timeout(timeout) {
                Ok(item) => self.accept(item, &mut frames),
                Err(RecvTimeoutError::Timeout) => return Ok(frames),
                Err(RecvTimeoutError::Disconnected) => self.mark_closed(None),
            }
        }
        self.drain_ready(&mut frames);

        if frames.is_empty() && !self.connected {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(frames)
    }

    fn ping(&mut self, timeout: Duration) -> Result<(), TransportError> {
        // Anything already queued belongs to the caller, not to this probe.
        let mut early = Vec::new();
        self.drain_ready(&mut early);
        self.buffered.extend(early);

        if !self.connected {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(Outbound::Ping)
            .map_err(|_| TransportError::ConnectionClosed)?;

        // A timeout past the end of `Instant` waits without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let remaining =
                deadline.map_or(timeout, |at| at.saturating_duration_since(Instant::now()));
            match self.inbound.recv_timeout(remaining) {
                Ok(Inbound::Pong) => return Ok(()),
                Ok(Inbound::Event(frame)) => self.buffered.push_back(frame),
                Ok(Inbound::Closed(reason)) => {
                    self.mark_closed(reason);
                    return Err(TransportError::ConnectionClosed);
                }
                Err(RecvTimeoutError::Timeout) => return Err(TransportError::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => {
                    self.mark_closed(None);
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.connected {
            let _ = self.outbound.send(Outbound::Close);
            self.mark_closed(Some("closed locally".into()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected && !self.outbound.is_closed()
    }
}

impl Drop for ThreadedTransport {
    fn drop(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}
