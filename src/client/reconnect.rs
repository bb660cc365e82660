// ! Reconnection state machine
// !
// ! Pure state transitions and backoff math for SSE reconnection. The client
// ! drives the timers and I/O; this module only decides what happens next.

use std::time::Duration;

use crate::client::config::ReconnectConfig;

/// Where the reconnection machinery currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPhase {
    /// Connected, or idle with nothing to recover
    Stable,
    /// Waiting `delay` before making attempt number `attempt` (0-based)
    Scheduled { attempt: u32, delay: Duration },
    /// Attempt number `attempt` is in flight
    Reconnecting { attempt: u32 },
    /// Gave up after `attempts` failed attempts
    Failed { attempts: u32 },
}

/// What the caller must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    /// Sleep `delay`, then make attempt `attempt`
    Schedule { attempt: u32, delay: Duration },
    /// Stop retrying and report exhaustion once
    GiveUp { attempts: u32 },
    /// Nothing to do
    Ignore,
}

/// Reconnection state of one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectState {
    phase: ReconnectPhase,
    attempts: u32,
    intentional_disconnect: bool,
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectState {
    pub fn new() -> Self {
        Self {
            phase: ReconnectPhase::Stable,
            attempts: 0,
            intentional_disconnect: false,
        }
    }

    pub fn phase(&self) -> ReconnectPhase {
        self.phase
    }

    /// Consecutive failed attempts since the last stable connection
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_intentional(&self) -> bool {
        self.intentional_disconnect
    }

    /// A fresh `connect()` clears everything, including the intentional flag
    pub fn on_connect(&mut self) {
        *self = Self::new();
    }

    /// The caller asked to disconnect; no further reconnects may start
    pub fn mark_intentional(&mut self) {
        self.intentional_disconnect = true;
        self.phase = ReconnectPhase::Stable;
        self.attempts = 0;
    }

    /// The stream ended or failed
    pub fn on_disconnect(&mut self, policy: &ReconnectConfig) -> ReconnectAction {
        if self.intentional_disconnect || !policy.enabled {
            return ReconnectAction::Ignore;
        }
        match self.phase {
            ReconnectPhase::Stable => self.schedule(self.attempts, policy),
            // A retry cycle already owns recovery
            _ => ReconnectAction::Ignore,
        }
    }

    /// The scheduled delay elapsed; returns the attempt to make, if any
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.intentional_disconnect {
            return None;
        }
        match self.phase {
            ReconnectPhase::Scheduled { attempt, .. } => {
                self.phase = ReconnectPhase::Reconnecting { attempt };
                Some(attempt)
            }
            _ => None,
        }
    }

    /// The in-flight attempt failed
    pub fn on_failure(&mut self, policy: &ReconnectConfig) -> ReconnectAction {
        if self.intentional_disconnect {
            return ReconnectAction::Ignore;
        }
        match self.phase {
            ReconnectPhase::Reconnecting { attempt } => {
                self.attempts = attempt + 1;
                self.schedule(attempt + 1, policy)
            }
            _ => ReconnectAction::Ignore,
        }
    }

    /// The in-flight attempt succeeded
    pub fn on_success(&mut self) {
        self.phase = ReconnectPhase::Stable;
        self.attempts = 0;
    }

    /// Any inbound message proves the connection healthy
    pub fn on_data_received(&mut self) {
        if self.phase == ReconnectPhase::Stable {
            self.attempts = 0;
        }
    }

    fn schedule(&mut self, attempt: u32, policy: &ReconnectConfig) -> ReconnectAction {
        if attempt >= policy.max_attempts {
            self.phase = ReconnectPhase::Failed { attempts: attempt };
            return ReconnectAction::GiveUp { attempts: attempt };
        }
        let delay = backoff_delay(policy, attempt);
        self.phase = ReconnectPhase::Scheduled { attempt, delay };
        ReconnectAction::Schedule { attempt, delay }
    }
}

/// `min(initial * multiplier^attempt, max)`, optionally jittered
pub fn backoff_delay(policy: &ReconnectConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base_delay = policy.initial_delay_ms as f64 * policy.backoff_multiplier.powi(exponent);
    let capped_delay = base_delay.min(policy.max_delay_ms as f64);

    let final_delay = if policy.jitter_factor > 0.0 {
        let jitter_range = capped_delay * policy.jitter_factor;
        let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_range;
        (capped_delay + jitter).max(0.0)
    } else {
        capped_delay
    };

    Duration::from_millis(final_delay as u64)
}
