//! Health classification from rolling probe outcomes.
//!
//! Pure state machine, deliberately free of clocks and I/O: the caller
//! supplies the elapsed time since launch with each observation, so every
//! transition is deterministic and directly testable.

use std::time::Duration;

use serde::Serialize;

/// Classification of the supervised container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Inside the start-period grace window; failures do not count.
    Starting,
    /// Last probe succeeded.
    Healthy,
    /// At least `retries` consecutive failures after the start period.
    Unhealthy,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Rolling record of probe outcomes.
///
/// Transition rules:
/// - a single success moves any state to `Healthy` and resets the
///   consecutive-failure count;
/// - failures during the start period are recorded but never transition the
///   record out of `Starting`;
/// - after the start period, `retries` consecutive failures transition to
///   `Unhealthy` on the Nth failure exactly, staying there on further
///   failures.
#[derive(Debug)]
pub struct HealthRecord {
    state: HealthState,
    retries: u32,
    start_period: Duration,
    consecutive_failures: u32,
    grace_failures: u32,
}

impl HealthRecord {
    pub fn new(retries: u32, start_period: Duration) -> Self {
        Self {
            state: HealthState::Starting,
            retries,
            start_period,
            consecutive_failures: 0,
            grace_failures: 0,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Consecutive failures counted against the retry budget.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Failures observed inside the start period (informational only).
    pub fn grace_failures(&self) -> u32 {
        self.grace_failures
    }

    /// Record one probe outcome taken `elapsed` after launch.
    ///
    /// Returns the new state when the observation causes a transition.
    pub fn observe(&mut self, passed: bool, elapsed: Duration) -> Option<HealthState> {
        if passed {
            self.consecutive_failures = 0;
            return self.transition(HealthState::Healthy);
        }

        if elapsed < self.start_period {
            // Recorded, but not counted against the retry budget.
            self.grace_failures += 1;
            return None;
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.retries {
            return self.transition(HealthState::Unhealthy);
        }
        None
    }

    fn transition(&mut self, to: HealthState) -> Option<HealthState> {
        if self.state == to {
            return None;
        }
        self.state = to;
        Some(to)
    }
}
