//! Unified error types for the Vigil core.
//!
//! Session-level and configuration errors live in `vigil-runtime`.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors reported by a [`SessionTransport`](crate::SessionTransport).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Message or probe send failed.
    #[error("failed to send: {0}")]
    SendFailed(String),

    /// The transport has no live connection.
    #[error("transport is not connected")]
    NotConnected,

    /// The operation did not complete in time.
    #[error("transport operation timed out")]
    Timeout,

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl TransportError {
    /// Creates a send failure.
    pub fn send(msg: impl Into<String>) -> Self {
        Self::SendFailed(msg.into())
    }

    /// Creates a connection-closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Listener Errors
// =============================================================================

/// Error returned by a [`MessageListener`](crate::MessageListener) callback.
///
/// The fanout logs it and keeps delivering to the remaining listeners.
#[derive(Debug, Clone, Error)]
#[error("listener failed: {0}")]
pub struct ListenerError(String);

impl ListenerError {
    /// Creates a listener error with the given message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for listener callbacks.
pub type ListenerResult = Result<(), ListenerError>;
