use crate::bridge::Bridge;
use crate::state::ConnectionState;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runs [`Bridge::heartbeat`] on its own thread at a fixed interval.
///
/// Besides checking liveness, every beat pumps the transport, so inbound
/// events are delivered even while nothing else is calling into the bridge.
/// The thread ends once the bridge disconnects or the monitor is stopped.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<ConnectionState>>,
}

impl HeartbeatMonitor {
    pub fn start(bridge: Bridge, interval: Duration) -> io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let name = format!("cep-heartbeat-{}", bridge.identifier());

        let worker = thread::Builder::new().name(name).spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!(identifier = bridge.identifier(), "Heartbeat stopped");
                    return bridge.state();
                }
            }
            let state = bridge.heartbeat();
            tracing::trace!(identifier = bridge.identifier(), %state, "Heartbeat");
            if state == ConnectionState::Disconnected {
                return state;
            }
        })?;

        Ok(Self {
            stop: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Starts a monitor using the bridge's configured interval.
    pub fn for_bridge(bridge: &Bridge) -> io::Result<Self> {
        let interval = bridge.config().heartbeat_interval;
        Self::start(bridge.clone(), interval)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Stops the monitor and returns the state it last saw.
    pub fn stop(mut self) -> Option<ConnectionState> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<ConnectionState> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        self.worker.take().and_then(|worker| worker.join().ok())
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
