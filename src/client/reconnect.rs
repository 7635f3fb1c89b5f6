//! Reconnect policy
//!
//! `Connecting → Open → Closed`, or `→ Reconnecting → Connecting` after an
//! abnormal close or error. A clean close (code 1000) is final.

use std::time::Duration;

/// WebSocket close code for a normal closure
pub const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    Closed,
    Reconnecting,
}

/// Fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
        }
    }
}

/// What the caller should do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Keep reading
    Continue,
    /// Sleep for the delay, then call `on_retry` and connect again
    RetryAfter(Duration),
    Stop,
}

#[derive(Debug)]
pub struct ReconnectMachine {
    state: LinkState,
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: LinkState::Connecting,
            policy,
            attempts: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Reconnect attempts since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn on_open(&mut self) -> NextStep {
        match self.state {
            LinkState::Connecting => {
                self.state = LinkState::Open;
                self.attempts = 0;
                NextStep::Continue
            }
            LinkState::Open => NextStep::Continue,
            LinkState::Closed => NextStep::Stop,
            // Opened while still waiting out the delay; treat as a retry that landed
            LinkState::Reconnecting => {
                self.state = LinkState::Open;
                self.attempts = 0;
                NextStep::Continue
            }
        }
    }

    /// The server closed the link; `code` is `None` when the stream ended
    /// without a close frame.
    pub fn on_close(&mut self, code: Option<u16>) -> NextStep {
        if self.state == LinkState::Closed {
            return NextStep::Stop;
        }
        if code == Some(NORMAL_CLOSURE) {
            self.state = LinkState::Closed;
            return NextStep::Stop;
        }
        self.schedule_retry()
    }

    /// Connect failure or protocol error
    pub fn on_error(&mut self) -> NextStep {
        if self.state == LinkState::Closed {
            return NextStep::Stop;
        }
        self.schedule_retry()
    }

    /// The delay has elapsed
    pub fn on_retry(&mut self) {
        if self.state == LinkState::Reconnecting {
            self.state = LinkState::Connecting;
            self.attempts += 1;
        }
    }

    /// Stop for good, whatever the current state
    pub fn shutdown(&mut self) {
        self.state = LinkState::Closed;
    }

    fn schedule_retry(&mut self) -> NextStep {
        self.state = LinkState::Reconnecting;
        NextStep::RetryAfter(self.policy.delay)
    }
}

impl Default for ReconnectMachine {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
