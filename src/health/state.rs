//! Backend health state machine.
//!
//! # States
//! - Healthy: backend is eligible for selection
//! - Unhealthy: backend excluded until its cooldown has elapsed
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: failure reported (stamps unhealthy_since)
//! Unhealthy → Unhealthy: further reports ignored, stamp kept
//! Unhealthy → Healthy: evaluated at selection time once now - unhealthy_since >= cooldown
//! ```
//!
//! Fixed window only. No backoff, no half-open probing.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Health state of one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// What caused a backend to be withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The worker reported its outbound connection failed.
    WorkerSignal,
    /// The relay could not open a connection to the worker.
    Dial,
    /// An established relay failed (only under `any_relay_error`).
    Relay,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::WorkerSignal => "worker_signal",
            FailureReason::Dial => "dial",
            FailureReason::Relay => "relay",
        };
        f.write_str(s)
    }
}

/// Mutable health record for one backend.
#[derive(Debug, Clone)]
pub struct BackendHealth {
    state: HealthState,
    unhealthy_since: Option<Instant>,
}

impl BackendHealth {
    pub fn new() -> Self {
        Self {
            state: HealthState::Healthy,
            unhealthy_since: None,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn unhealthy_since(&self) -> Option<Instant> {
        self.unhealthy_since
    }

    /// Mark unhealthy at `now`. Returns `true` on a Healthy → Unhealthy
    /// transition; an already-unhealthy backend keeps its original stamp.
    pub fn mark_unhealthy(&mut self, now: Instant) -> bool {
        if self.state == HealthState::Unhealthy {
            return false;
        }
        self.state = HealthState::Unhealthy;
        self.unhealthy_since = Some(now);
        true
    }

    /// Re-evaluate eligibility at `now`. Returns `true` if the backend just
    /// recovered.
    pub fn refresh(&mut self, now: Instant, cooldown: Duration) -> bool {
        match (self.state, self.unhealthy_since) {
            (HealthState::Unhealthy, Some(since)) if now.saturating_duration_since(since) >= cooldown => {
                self.state = HealthState::Healthy;
                self.unhealthy_since = None;
                true
            }
            _ => false,
        }
    }

    /// Time left before the backend becomes eligible again.
    pub fn cooldown_remaining(&self, now: Instant, cooldown: Duration) -> Duration {
        match self.unhealthy_since {
            Some(since) if self.state == HealthState::Unhealthy => {
                cooldown.saturating_sub(now.saturating_duration_since(since))
            }
            _ => Duration::ZERO,
        }
    }
}

impl Default for BackendHealth {
    fn default() -> Self {
        Self::new()
    }
}
