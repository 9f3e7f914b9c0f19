//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, VigilConfig, WatchdogSettings};

/// Longest accepted watchdog duration, in seconds (one week).
pub const MAX_WATCHDOG_SECS: u64 = 7 * 24 * 60 * 60;

/// Validates the entire configuration.
pub fn validate_config(config: &VigilConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_watchdog("*", &config.watchdog)?;

    for name in config.adapters.keys() {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid adapter name: {name:?}"
            )));
        }
        let resolved = config.watchdog_for(name);
        validate_watchdog(
            name,
            &WatchdogSettings {
                probe_interval_secs: resolved.probe_interval.as_secs(),
                probe_timeout_secs: resolved.probe_timeout.as_secs(),
                failure_threshold: resolved.failure_threshold,
                reconnect_timeout_secs: resolved.reconnect_timeout.as_secs(),
            },
        )?;
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "File log output requires logging.file_path",
        ));
    }
    Ok(())
}

/// Validates one set of watchdog settings.
fn validate_watchdog(adapter: &str, settings: &WatchdogSettings) -> ConfigResult<()> {
    if settings.probe_interval_secs == 0 {
        return Err(ConfigError::watchdog(
            adapter,
            "Probe interval must be greater than 0",
        ));
    }

    if settings.probe_timeout_secs == 0 {
        return Err(ConfigError::watchdog(
            adapter,
            "Probe timeout must be greater than 0",
        ));
    }

    if settings.failure_threshold == 0 {
        return Err(ConfigError::watchdog(
            adapter,
            "Failure threshold must be at least 1",
        ));
    }

    if settings.reconnect_timeout_secs == 0 {
        return Err(ConfigError::watchdog(
            adapter,
            "Reconnect timeout must be greater than 0",
        ));
    }

    for (name, secs) in [
        ("Probe interval", settings.probe_interval_secs),
        ("Probe timeout", settings.probe_timeout_secs),
        ("Reconnect timeout", settings.reconnect_timeout_secs),
    ] {
        if secs > MAX_WATCHDOG_SECS {
            return Err(ConfigError::watchdog(
                adapter,
                format!("{name} must be at most {MAX_WATCHDOG_SECS} seconds, got {secs}"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::WatchdogOverrides;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&VigilConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_threshold() {
        let mut config = VigilConfig::default();
        config.watchdog.failure_threshold = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidWatchdog { .. })
        ));
    }

    #[test]
    fn test_validate_adapter_override() {
        let mut config = VigilConfig::default();
        config.adapters.insert(
            "irc".to_string(),
            WatchdogOverrides {
                probe_timeout_secs: Some(0),
                ..Default::default()
            },
        );

        let result = validate_config(&config);
        assert!(
            matches!(result, Err(ConfigError::InvalidWatchdog { ref adapter, .. }) if adapter == "irc")
        );
    }

    #[test]
    fn test_validate_rejects_oversized_durations() {
        let mut config = VigilConfig::default();
        config.watchdog.probe_timeout_secs = u64::MAX;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidWatchdog { ref adapter, .. }) if adapter == "*"
        ));

        let mut config = VigilConfig::default();
        config.adapters.insert(
            "xmpp".to_string(),
            WatchdogOverrides {
                probe_interval_secs: Some(MAX_WATCHDOG_SECS + 1),
                ..Default::default()
            },
        );
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidWatchdog { ref adapter, .. }) if adapter == "xmpp"
        ));

        let mut config = VigilConfig::default();
        config.watchdog.reconnect_timeout_secs = MAX_WATCHDOG_SECS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_file_output_without_path() {
        let mut config = VigilConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
    }
}
