//! Seams between a session and its protocol adapter.
//!
//! ```text
//!  ┌──────────────┐  SessionTransport   ┌────────────────┐
//!  │   Session    │ ──────────────────▶ │    Adapter     │
//!  │   (runtime)  │ ◀────────────────── │  (transport)   │
//!  └──────────────┘   SessionHandler    └────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::foundation::error::TransportResult;
use crate::foundation::event::DeliveryFailure;
use crate::foundation::message::{Contact, Message};
use crate::liveness::probe::ProbeToken;

/// A packet the adapter has already classified.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPacket {
    /// Echo of a liveness probe.
    ProbeEcho(ProbeToken),
    /// A message from a contact.
    Received {
        /// Sender.
        from: Contact,
        /// The message.
        message: Message,
    },
    /// The server reported that a message could not be delivered.
    DeliveryFailed {
        /// Intended recipient.
        to: Contact,
        /// The message that failed.
        message: Message,
        /// Reason reported by the server.
        failure: DeliveryFailure,
    },
}

impl InboundPacket {
    /// Returns a short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProbeEcho(_) => "probe_echo",
            Self::Received { .. } => "received",
            Self::DeliveryFailed { .. } => "delivery_failed",
        }
    }
}

/// Outbound operations a session needs from its adapter.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Returns the adapter name, used in logs and configuration lookup.
    fn name(&self) -> &str;

    /// Sends a liveness probe carrying `token`.
    ///
    /// The peer is expected to echo the token back, which the adapter reports
    /// as [`InboundPacket::ProbeEcho`].
    async fn send_probe(&self, token: ProbeToken) -> TransportResult<()>;

    /// Sends a user message.
    async fn send_message(&self, to: &Contact, message: &Message) -> TransportResult<()>;

    /// Tears down and re-establishes the connection.
    ///
    /// Resolves once the new connection is registered or the attempt failed.
    async fn perform_reconnect(&self) -> TransportResult<()>;
}

/// Boxed transport.
pub type BoxedTransport = Arc<dyn SessionTransport>;

/// Inbound notifications an adapter delivers to its session.
///
/// All methods are non-blocking and may be called from the adapter's
/// receive task.
pub trait SessionHandler: Send + Sync {
    /// The transport completed registration with the server.
    fn on_registered(&self);

    /// A classified packet arrived.
    fn on_packet(&self, packet: InboundPacket);

    /// The transport failed or was closed underneath the session.
    fn on_transport_error(&self, reason: &str);
}

/// Boxed session handler.
pub type BoxedSessionHandler = Arc<dyn SessionHandler>;
