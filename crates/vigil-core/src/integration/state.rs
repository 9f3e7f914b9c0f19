//! Connection state of a session.

use std::fmt;

/// Registration state of a protocol session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected, or the transport reported a disconnect.
    #[default]
    Disconnected,
    /// Connected and registered; the watchdog is running.
    Registered,
    /// The watchdog escalated and a reconnect is in progress.
    Reconnecting,
    /// Reconnect failed; waits for an external re-registration.
    Failed,
}

impl ConnectionState {
    /// Returns whether an escalation may start from this state.
    pub fn can_escalate(&self) -> bool {
        !matches!(self, Self::Reconnecting | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Registered => write!(f, "Registered"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}
