//! Watchdog configuration.

use std::time::Duration;

/// Default time between probe cycles.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(180);

/// Default wait window for a probe echo.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Default number of consecutive missed probes before escalation.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default upper bound on a single reconnect attempt.
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Liveness watchdog and reconnect settings for one session.
///
/// Supplied at session construction; there is no dynamic reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Time from the end of one cycle to the next probe.
    pub probe_interval: Duration,
    /// How long to wait for the probe echo.
    pub probe_timeout: Duration,
    /// Consecutive failures that trigger an escalation.
    pub failure_threshold: u32,
    /// How long the reconnect policy waits for the adapter to reconnect.
    pub reconnect_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
        }
    }
}

impl WatchdogConfig {
    /// Sets the probe interval.
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Sets the probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the reconnect timeout.
    pub fn with_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    /// Returns the threshold the state machine actually uses (never zero).
    pub fn effective_threshold(&self) -> u32 {
        self.failure_threshold.max(1)
    }
}
