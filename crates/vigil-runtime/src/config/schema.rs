//! Configuration schema definitions.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [watchdog]
//! probe_interval_secs = 180
//! probe_timeout_secs = 20
//! failure_threshold = 3
//!
//! # Per-adapter overrides; unset fields fall back to [watchdog].
//! [adapters.irc]
//! probe_interval_secs = 60
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_core::{
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_RECONNECT_TIMEOUT, WatchdogConfig,
};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VigilConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Watchdog defaults shared by every adapter.
    #[serde(default)]
    pub watchdog: WatchdogSettings,

    /// Per-adapter watchdog overrides, keyed by adapter name.
    #[serde(default)]
    pub adapters: HashMap<String, WatchdogOverrides>,
}

impl VigilConfig {
    /// Resolves the watchdog configuration for `adapter`.
    pub fn watchdog_for(&self, adapter: &str) -> WatchdogConfig {
        let base = &self.watchdog;
        let Some(overrides) = self.adapters.get(adapter) else {
            return base.to_core();
        };

        WatchdogSettings {
            probe_interval_secs: overrides
                .probe_interval_secs
                .unwrap_or(base.probe_interval_secs),
            probe_timeout_secs: overrides
                .probe_timeout_secs
                .unwrap_or(base.probe_timeout_secs),
            failure_threshold: overrides
                .failure_threshold
                .unwrap_or(base.failure_threshold),
            reconnect_timeout_secs: overrides
                .reconnect_timeout_secs
                .unwrap_or(base.reconnect_timeout_secs),
        }
        .to_core()
    }
}

// =============================================================================
// Watchdog
// =============================================================================

/// Watchdog defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogSettings {
    /// Seconds between probe cycles.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Seconds to wait for a probe echo.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Consecutive missed probes before a reconnect is forced.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds a reconnect attempt may take before the session is failed.
    #[serde(default = "default_reconnect_timeout_secs")]
    pub reconnect_timeout_secs: u64,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            failure_threshold: default_failure_threshold(),
            reconnect_timeout_secs: default_reconnect_timeout_secs(),
        }
    }
}

impl WatchdogSettings {
    /// Converts to the core watchdog config.
    pub fn to_core(&self) -> WatchdogConfig {
        WatchdogConfig {
            probe_interval: Duration::from_secs(self.probe_interval_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            failure_threshold: self.failure_threshold,
            reconnect_timeout: Duration::from_secs(self.reconnect_timeout_secs),
        }
    }
}

fn default_probe_interval_secs() -> u64 {
    DEFAULT_PROBE_INTERVAL.as_secs()
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_secs()
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_reconnect_timeout_secs() -> u64 {
    DEFAULT_RECONNECT_TIMEOUT.as_secs()
}

/// Adapter-specific watchdog overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogOverrides {
    #[serde(default)]
    pub probe_interval_secs: Option<u64>,
    #[serde(default)]
    pub probe_timeout_secs: Option<u64>,
    #[serde(default)]
    pub failure_threshold: Option<u32>,
    #[serde(default)]
    pub reconnect_timeout_secs: Option<u64>,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `Full` without it.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread IDs.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers.
    #[serde(default)]
    pub file_location: bool,

    /// Log file path, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module level overrides, e.g. `vigil_runtime = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_watchdog_matches_core_defaults() {
        let config = VigilConfig::default();
        assert_eq!(config.watchdog_for("irc"), WatchdogConfig::default());
    }

    #[test]
    fn test_adapter_override_merges_with_defaults() {
        let mut config = VigilConfig::default();
        config.adapters.insert(
            "jabber".to_string(),
            WatchdogOverrides {
                probe_interval_secs: Some(60),
                failure_threshold: Some(5),
                ..Default::default()
            },
        );

        let jabber = config.watchdog_for("jabber");
        assert_eq!(jabber.probe_interval, Duration::from_secs(60));
        assert_eq!(jabber.failure_threshold, 5);
        assert_eq!(jabber.probe_timeout, DEFAULT_PROBE_TIMEOUT);

        assert_eq!(config.watchdog_for("yahoo"), WatchdogConfig::default());
    }
}
