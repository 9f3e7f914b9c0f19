//! Runtime error types.

use thiserror::Error;

pub use crate::config::error::{ConfigError, ConfigResult};

/// Errors that can occur while building or driving a session.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] vigil_core::TransportError),

    /// A session was built without a transport.
    #[error("Session '{0}' has no transport")]
    MissingTransport(String),

    /// A session was built outside a tokio runtime without a runtime handle.
    #[error("Session '{0}' needs a tokio runtime")]
    NoRuntime(String),

    /// The session has been shut down.
    #[error("Session '{0}' is closed")]
    SessionClosed(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
