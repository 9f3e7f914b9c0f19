//! Reconnect policy: turns a watchdog escalation into one reconnect attempt.
//!
//! ```text
//!   Registered ──escalate──▶ Reconnecting ──perform_reconnect ok──▶ Registered
//!                                 │
//!                                 └── error / timeout ──▶ Failed
//! ```
//!
//! An escalation while already `Reconnecting` or `Failed` is suppressed, so a
//! session never has more than one attempt in flight. There is no retry loop:
//! `Failed` is left only by an external re-registration.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, debug, info, span, warn};
use vigil_core::{DEFAULT_RECONNECT_TIMEOUT, TransportError, TransportResult};

/// Result of one reconnect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// The adapter reconnected and re-registered.
    Succeeded,
    /// The attempt failed or timed out.
    Failed {
        /// Why the attempt failed.
        reason: String,
    },
}

impl ReconnectOutcome {
    /// Returns whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for ReconnectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// What the policy needs from the thing it reconnects.
#[async_trait]
pub trait ReconnectTarget: Send + Sync + 'static {
    /// Name used in log fields.
    fn label(&self) -> String;

    /// Atomically enters `Reconnecting` and stops liveness monitoring.
    ///
    /// Returns `false`, changing nothing, if the target is already
    /// reconnecting, has failed, or is closed.
    fn begin_reconnect(&self) -> bool;

    /// Tears down and re-establishes the connection.
    async fn perform_reconnect(&self) -> TransportResult<()>;

    /// Applies the outcome if the target is still `Reconnecting`.
    ///
    /// Returns whether it was applied.
    fn complete_reconnect(&self, outcome: &ReconnectOutcome) -> bool;
}

/// Result of [`ReconnectPolicy::escalate`].
#[derive(Debug)]
pub enum Escalation {
    /// A reconnect attempt was spawned.
    Started(JoinHandle<ReconnectOutcome>),
    /// A reconnect is already in flight or the target has failed.
    Suppressed,
}

impl Escalation {
    /// Returns whether an attempt was started.
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

/// Counters kept by a [`ReconnectPolicy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectStats {
    /// Attempts spawned.
    pub started: u64,
    /// Escalations ignored because an attempt was running or had failed.
    pub suppressed: u64,
    /// Attempts that errored or timed out.
    pub failed: u64,
}

/// Runs at most one bounded reconnect attempt per escalation.
#[derive(Debug)]
pub struct ReconnectPolicy {
    timeout: Duration,
    runtime: Option<Handle>,
    started: AtomicU64,
    suppressed: AtomicU64,
    failed: AtomicU64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_TIMEOUT)
    }
}

impl ReconnectPolicy {
    /// Creates a policy whose attempts are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            runtime: None,
            started: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Spawns attempts on `runtime` instead of the caller's runtime.
    pub fn on_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Returns the attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Starts a reconnect of `target` unless one is already running.
    ///
    /// The state change happens before this returns; the attempt itself runs
    /// on a spawned task, so the caller never waits for the network. Without
    /// [`on_runtime`](Self::on_runtime) this must be called from within a
    /// tokio runtime.
    pub fn escalate<T: ReconnectTarget>(self: &Arc<Self>, target: Arc<T>) -> Escalation {
        let label = target.label();
        if !target.begin_reconnect() {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(session = %label, "Escalation suppressed, reconnect already handled");
            return Escalation::Suppressed;
        }

        self.started.fetch_add(1, Ordering::Relaxed);
        info!(session = %label, timeout = ?self.timeout, "Starting reconnect");

        let policy = Arc::clone(self);
        let span = span!(Level::INFO, "reconnect", session = %label);
        let attempt = async move {
            let outcome =
                match tokio::time::timeout(policy.timeout, target.perform_reconnect()).await {
                    Ok(Ok(())) => ReconnectOutcome::Succeeded,
                    Ok(Err(e)) => ReconnectOutcome::Failed {
                        reason: e.to_string(),
                    },
                    Err(_) => ReconnectOutcome::Failed {
                        reason: TransportError::Timeout.to_string(),
                    },
                };

            if outcome.is_success() {
                info!("Reconnect succeeded");
            } else {
                policy.failed.fetch_add(1, Ordering::Relaxed);
                warn!(outcome = %outcome, "Reconnect failed");
            }

            if !target.complete_reconnect(&outcome) {
                debug!(outcome = %outcome, "Reconnect outcome superseded");
            }
            outcome
        }
        .instrument(span);

        let task = match &self.runtime {
            Some(runtime) => runtime.spawn(attempt),
            None => tokio::spawn(attempt),
        };
        Escalation::Started(task)
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> ReconnectStats {
        ReconnectStats {
            started: self.started.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
