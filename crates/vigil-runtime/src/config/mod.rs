//! Configuration for Vigil sessions.
//!
//! Loads logging settings and watchdog defaults, with per-adapter overrides,
//! from files and the environment.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig, VigilConfig,
    WatchdogOverrides, WatchdogSettings,
};
pub use validation::validate_config;
