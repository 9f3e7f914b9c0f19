//! # Vigil Core
//!
//! The transport-agnostic core shared by every protocol adapter of the Vigil
//! messaging client.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Errors**: [`TransportError`], [`ListenerError`]
//! - **Message model**: [`Message`], [`Contact`], [`MessageEvent`]
//!
//! ### Liveness Layer
//!
//! - **Correlation**: [`ProbeCorrelator`] issues tokened probes and matches echoes
//! - **Watchdog**: [`LivenessWatchdog`] counts missed probes and reports escalations
//!
//! ### Integration Layer
//!
//! - **Fanout**: [`EventFanout`] delivers events to [`MessageListener`]s
//! - **Adapter seams**: [`SessionTransport`] (core → adapter) and
//!   [`SessionHandler`] (adapter → core)
//!
//! The timer, reconnect policy and session facade that tie these together live
//! in `vigil-runtime`.
//!
//! ```text
//! ┌───────────┐  ProbeEcho   ┌────────────────┐       ┌──────────────────┐
//! │  Adapter  │─────────────▶│ProbeCorrelator │◀──────│ LivenessWatchdog │
//! │ (receive) │              └────────────────┘       └──────────────────┘
//! │           │  Received    ┌────────────────┐       ┌──────────────────┐
//! │           │─────────────▶│  EventFanout   │──────▶│    Listeners     │
//! └───────────┘              └────────────────┘       └──────────────────┘
//! ```

// Architectural layers
pub mod foundation;
pub mod integration;
pub mod liveness;

// Re-export foundation types
pub use foundation::{
    Contact, DEFAULT_CONTENT_TYPE, DeliveryFailure, ListenerError, ListenerResult, Message,
    MessageDelivered, MessageDeliveryFailed, MessageEvent, MessageId, MessageReceived,
    TransportError, TransportResult,
};

// Re-export liveness types
pub use liveness::{
    CorrelatorStats, CycleOutcome, DEFAULT_FAILURE_THRESHOLD, DEFAULT_PROBE_INTERVAL,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_RECONNECT_TIMEOUT, LivenessWatchdog, PENDING_CAPACITY, Probe,
    ProbeCorrelator, ProbeToken, SessionId, WatchdogConfig, WatchdogPhase,
};

// Re-export integration types
pub use integration::{
    BoxedListener, BoxedSessionHandler, BoxedTransport, ConnectionState, EventFanout,
    InboundPacket, MessageListener, SessionHandler, SessionTransport,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::integration::{
        BoxedListener, ConnectionState, InboundPacket, MessageListener, SessionHandler,
        SessionTransport,
    };
    pub use super::liveness::{ProbeToken, WatchdogConfig};
}
