//! Connection state machine
//!
//! Pure retry/lifecycle logic, kept free of transport concerns so the
//! transition rules can be tested without sockets.

/// Connection lifecycle state, published to the caller on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_reconnecting(&self) -> bool {
        matches!(self, ConnectionState::Reconnecting)
    }

    /// Terminal failure; only an explicit reconnect restarts the cycle
    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionState::Failed)
    }
}

/// What to do after a transport close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePlan {
    /// Schedule a reconnect attempt after the fixed delay
    Retry { attempt: u32 },
    /// Retry budget exhausted; declare permanent failure
    GiveUp,
    /// Close observed outside an active session; no transition
    Ignore,
}

/// Tracks the connection lifecycle and the bounded retry budget
#[derive(Debug)]
pub struct ConnectionTracker {
    state: ConnectionState,
    retries: u32,
    max_retries: u32,
}

impl ConnectionTracker {
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retries: 0,
            max_retries,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Explicit connect request. Allowed from Disconnected and Failed;
    /// restarting from Failed resets the retry counter.
    pub fn connect_requested(&mut self) -> bool {
        match self.state {
            ConnectionState::Disconnected => {
                self.state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Failed => {
                self.retries = 0;
                self.state = ConnectionState::Connecting;
                true
            }
            _ => false,
        }
    }

    /// Transport opened; the retry counter resets on every successful open
    pub fn opened(&mut self) {
        self.state = ConnectionState::Connected;
        self.retries = 0;
    }

    /// Transport closed while a session was active (or being established)
    pub fn transport_closed(&mut self) -> ClosePlan {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => ClosePlan::Ignore,
            _ if self.retries < self.max_retries => {
                self.retries += 1;
                self.state = ConnectionState::Reconnecting;
                ClosePlan::Retry {
                    attempt: self.retries,
                }
            }
            _ => {
                self.state = ConnectionState::Failed;
                ClosePlan::GiveUp
            }
        }
    }

    /// The reconnect delay elapsed. Returns false when a close request
    /// landed in the window, which cancels the pending attempt.
    pub fn reconnect_due(&mut self) -> bool {
        if self.state == ConnectionState::Reconnecting {
            self.state = ConnectionState::Connecting;
            true
        } else {
            false
        }
    }

    /// Explicit close; idempotent from any state
    pub fn close_requested(&mut self) {
        self.state = ConnectionState::Disconnected;
    }
}
