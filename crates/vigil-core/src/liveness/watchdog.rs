//! Liveness watchdog state machine.
//!
//! The watchdog itself owns no timer. A driver (see `vigil-runtime`) calls
//! [`begin_cycle`](LivenessWatchdog::begin_cycle) when the probe interval
//! elapses and [`check`](LivenessWatchdog::check) when the wait window
//! closes, and acts on the returned [`CycleOutcome`].
//!
//! ```text
//!            begin_cycle            check
//!   ┌──────┐ ─────────▶ ┌───────────┐ ─────▶ ┌───────────────┐
//!   │ Idle │            │ ProbeSent │        │ AwaitingCheck │
//!   └──────┘ ◀───────── └───────────┘        └───────────────┘
//!      ▲    send failed                              │
//!      └─────────────────────────────────────────────┘
//!                 Alive / Missed / Escalate
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::probe::{Probe, ProbeCorrelator, ProbeToken};

/// Phase of the probe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogPhase {
    /// Waiting for the next probe interval.
    Idle,
    /// A probe was issued and handed to the transport.
    ProbeSent,
    /// The wait window closed and the echo is being evaluated.
    AwaitingCheck,
}

impl fmt::Display for WatchdogPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::ProbeSent => write!(f, "ProbeSent"),
            Self::AwaitingCheck => write!(f, "AwaitingCheck"),
        }
    }
}

/// Result of a completed cycle or a counted failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A valid echo arrived; the failure counter is zero.
    Alive,
    /// No valid echo; the counter is below the threshold.
    Missed {
        /// Consecutive failures so far.
        failures: u32,
    },
    /// The threshold was reached; the counter has been reset.
    ///
    /// The caller must escalate exactly once for this outcome.
    Escalate,
}

#[derive(Debug)]
struct WatchdogState {
    phase: WatchdogPhase,
    current: Option<ProbeToken>,
    failures: u32,
    escalations: u64,
}

/// Probe/check/escalate state machine with a consecutive-failure counter.
#[derive(Debug)]
pub struct LivenessWatchdog {
    correlator: Arc<ProbeCorrelator>,
    threshold: u32,
    state: Mutex<WatchdogState>,
}

impl LivenessWatchdog {
    /// Creates a watchdog; a zero threshold is treated as one.
    pub fn new(correlator: Arc<ProbeCorrelator>, threshold: u32) -> Self {
        Self {
            correlator,
            threshold: threshold.max(1),
            state: Mutex::new(WatchdogState {
                phase: WatchdogPhase::Idle,
                current: None,
                failures: 0,
                escalations: 0,
            }),
        }
    }

    /// Returns the correlator shared with the receive path.
    pub fn correlator(&self) -> &Arc<ProbeCorrelator> {
        &self.correlator
    }

    /// `Idle → ProbeSent`: issues the probe the driver must send.
    pub fn begin_cycle(&self) -> Probe {
        let mut state = self.state.lock();
        if state.phase != WatchdogPhase::Idle {
            warn!(phase = %state.phase, "Probe cycle started before the previous one resolved");
        }
        let probe = self.correlator.issue();
        state.phase = WatchdogPhase::ProbeSent;
        state.current = Some(probe.token());
        probe
    }

    /// The transport refused the probe: an immediate failed cycle.
    pub fn probe_send_failed(&self) -> CycleOutcome {
        let mut state = self.state.lock();
        if let Some(token) = state.current.take() {
            self.correlator.expire(token);
        }
        state.phase = WatchdogPhase::Idle;
        self.fail(&mut state)
    }

    /// `ProbeSent → AwaitingCheck → Idle`: evaluates the echo.
    pub fn check(&self) -> CycleOutcome {
        let mut state = self.state.lock();
        state.phase = WatchdogPhase::AwaitingCheck;

        let Some(token) = state.current.take() else {
            state.phase = WatchdogPhase::Idle;
            return self.fail(&mut state);
        };

        let resolved = self.correlator.is_resolved(token);
        state.phase = WatchdogPhase::Idle;
        if resolved {
            state.failures = 0;
            debug!(token = %token, "Probe answered");
            CycleOutcome::Alive
        } else {
            self.correlator.expire(token);
            self.fail(&mut state)
        }
    }

    /// Counts a failure outside the probe cycle (e.g. a failed message send).
    ///
    /// The phase of an in-flight cycle is left alone.
    pub fn record_failure(&self) -> CycleOutcome {
        let mut state = self.state.lock();
        self.fail(&mut state)
    }

    /// Resets the counter after a valid echo, without touching the phase.
    pub fn note_echo(&self) {
        self.state.lock().failures = 0;
    }

    /// Returns to `Idle` with a zeroed counter; used when monitoring (re)starts.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if let Some(token) = state.current.take() {
            self.correlator.expire(token);
        }
        state.phase = WatchdogPhase::Idle;
        state.failures = 0;
    }

    /// Returns the current phase.
    pub fn phase(&self) -> WatchdogPhase {
        self.state.lock().phase
    }

    /// Returns the consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.state.lock().failures
    }

    /// Returns how many escalations this watchdog has reported.
    pub fn escalations(&self) -> u64 {
        self.state.lock().escalations
    }

    /// Returns the escalation threshold.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    fn fail(&self, state: &mut WatchdogState) -> CycleOutcome {
        state.failures += 1;

        if state.failures >= self.threshold {
            state.failures = 0;
            state.escalations += 1;
            warn!(threshold = self.threshold, "Liveness threshold reached, escalating");
            CycleOutcome::Escalate
        } else {
            debug!(failures = state.failures, threshold = self.threshold, "Probe missed");
            CycleOutcome::Missed {
                failures: state.failures,
            }
        }
    }
}
