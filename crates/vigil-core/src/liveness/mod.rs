//! Liveness layer: probe correlation and the watchdog state machine.

pub mod config;
pub mod probe;
pub mod watchdog;

pub use config::{
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_RECONNECT_TIMEOUT, WatchdogConfig,
};
pub use probe::{CorrelatorStats, PENDING_CAPACITY, Probe, ProbeCorrelator, ProbeToken, SessionId};
pub use watchdog::{CycleOutcome, LivenessWatchdog, WatchdogPhase};
