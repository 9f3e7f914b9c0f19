//! Vigil Runtime - session orchestration for the Vigil messaging client.
//!
//! This crate provides:
//! - The [`ProtocolSession`] facade tying fanout, probe correlation and the
//!   liveness watchdog to a transport
//! - The owned [`WatchdogTimer`] that drives each session's probe cycles
//! - The [`ReconnectPolicy`] that turns an escalation into one bounded
//!   reconnect attempt
//! - Configuration loading and logging setup
//!
//! ```ignore
//! use vigil_runtime::{ProtocolSession, config::load_config, logging};
//!
//! let config = load_config()?;
//! logging::init_from_config(&config.logging);
//!
//! let session = ProtocolSession::builder("irc")
//!     .config_from(&config)
//!     .transport(transport.clone())
//!     .build()?;
//! transport.connect(session.handler()).await?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod reconnect;
pub mod session;
pub mod timer;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, VigilConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use reconnect::{Escalation, ReconnectOutcome, ReconnectPolicy, ReconnectStats, ReconnectTarget};
pub use session::{DeliveryReport, PacketDisposition, ProtocolSession, SessionBuilder, SessionStats};
pub use timer::{TimerTicket, WatchdogTimer};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
