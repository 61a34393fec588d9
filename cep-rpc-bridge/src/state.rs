use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport up, global scope being fetched.
    Connecting,
    Ready,
    /// Some heartbeats failed, but no more than the tolerance allows.
    Degraded,
    /// Terminal.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Result of feeding one heartbeat outcome into a [`Liveness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl Transition {
    /// Whether this transition is the one that ended the connection.
    pub fn disconnected(&self) -> bool {
        self.from != ConnectionState::Disconnected && self.to == ConnectionState::Disconnected
    }
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    failures: u32,
    last_heartbeat: Option<DateTime<Utc>>,
}

/// Connection state machine driven by heartbeat outcomes.
///
/// `Connecting -> Ready <-> Degraded -> Disconnected`. Once disconnected it
/// never leaves that state, so the transition into it is observed once.
#[derive(Debug)]
pub struct Liveness {
    tolerance: u32,
    inner: Mutex<Inner>,
}

impl Liveness {
    pub fn new(tolerance: u32) -> Self {
        Self {
            tolerance,
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                failures: 0,
                last_heartbeat: None,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn tolerance(&self) -> u32 {
        self.tolerance
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().failures
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_heartbeat
    }

    pub fn is_disconnected(&self) -> bool {
        self.state() == ConnectionState::Disconnected
    }

    pub fn mark_ready(&self) -> Transition {
        self.transition(|inner| {
            if inner.state == ConnectionState::Connecting {
                inner.state = ConnectionState::Ready;
            }
        })
    }

    pub fn record_success(&self) -> Transition {
        self.transition(|inner| {
            if inner.state == ConnectionState::Disconnected {
                return;
            }
            inner.failures = 0;
            inner.last_heartbeat = Some(Utc::now());
            inner.state = ConnectionState::Ready;
        })
    }

    /// Counts a failed heartbeat. Failures beyond the tolerance disconnect.
    pub fn record_failure(&self) -> Transition {
        let tolerance = self.tolerance;
        self.transition(|inner| {
            if inner.state == ConnectionState::Disconnected {
                return;
            }
            inner.failures = inner.failures.saturating_add(1);
            inner.state = if inner.failures > tolerance {
                ConnectionState::Disconnected
            } else {
                ConnectionState::Degraded
            };
        })
    }

    pub fn mark_disconnected(&self) -> Transition {
        self.transition(|inner| inner.state = ConnectionState::Disconnected)
    }

    fn transition(&self, apply: impl FnOnce(&mut Inner)) -> Transition {
        let mut inner = self.inner.lock();
        let from = inner.state;
        apply(&mut *inner);
        let to = inner.state;
        if from != to {
            tracing::debug!(%from, %to, failures = inner.failures, "Connection state changed");
        }
        Transition { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let liveness = Liveness::new(2);
        assert_eq!(liveness.state(), ConnectionState::Connecting);
        assert_eq!(liveness.mark_ready().to, ConnectionState::Ready);
        assert!(liveness.last_heartbeat().is_none());

        liveness.record_success();
        assert_eq!(liveness.state(), ConnectionState::Ready);
        assert!(liveness.last_heartbeat().is_some());
    }

    #[test]
    fn test_degraded_recovers() {
        let liveness = Liveness::new(2);
        liveness.mark_ready();

        assert_eq!(liveness.record_failure().to, ConnectionState::Degraded);
        assert_eq!(liveness.record_failure().to, ConnectionState::Degraded);
        assert_eq!(liveness.consecutive_failures(), 2);

        assert_eq!(liveness.record_success().to, ConnectionState::Ready);
        assert_eq!(liveness.consecutive_failures(), 0);
    }

    #[test]
    fn test_exceeding_tolerance_disconnects_once() {
        let liveness = Liveness::new(2);
        liveness.mark_ready();

        let transitions: Vec<_> = (0..5).map(|_| liveness.record_failure()).collect();
        let disconnects = transitions.iter().filter(|t| t.disconnected()).count();
        assert_eq!(disconnects, 1);
        assert!(transitions[2].disconnected());
        assert!(liveness.is_disconnected());

        assert!(!liveness.record_success().disconnected());
        assert_eq!(liveness.state(), ConnectionState::Disconnected);
        assert!(!liveness.mark_disconnected().disconnected());
    }

    #[test]
    fn test_zero_tolerance() {
        let liveness = Liveness::new(0);
        liveness.mark_ready();
        assert!(liveness.record_failure().disconnected());
    }
}
