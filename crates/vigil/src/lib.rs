//! # Vigil
//!
//! Liveness monitoring and message dispatch for a multi-protocol messaging
//! client.
//!
//! ## Overview
//!
//! Every protocol connection is wrapped in a [`ProtocolSession`]. The session
//! periodically sends a tokened probe through its transport and waits for the
//! echo; after too many consecutive misses it forces exactly one reconnect.
//! Messages flowing in either direction are fanned out to every subscribed
//! [`MessageListener`], with one faulty listener never starving the rest.
//!
//! ```text
//! ┌───────────┐  on_packet   ┌──────────────────┐  publish  ┌────────────┐
//! │ Transport │─────────────▶│ ProtocolSession  │──────────▶│ Listeners  │
//! │ (adapter) │◀─────────────│ watchdog + timer │           └────────────┘
//! └───────────┘  send_probe  └──────────────────┘
//!                                    │ escalate
//!                                    ▼
//!                            ReconnectPolicy ──▶ perform_reconnect
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil::prelude::*;
//! use vigil::transport::websocket::{WsClientConfig, WsSessionTransport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     init_from_config(&config.logging);
//!
//!     let transport = Arc::new(WsSessionTransport::new(WsClientConfig::new("ws://127.0.0.1:9000")));
//!     let session = ProtocolSession::builder("websocket")
//!         .config_from(&config)
//!         .transport(transport.clone())
//!         .build()?;
//!     transport.connect(session.handler()).await?;
//!
//!     session.send(Contact::new("alice"), Message::text("hello")).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `ws-client`: WebSocket client transport

pub use vigil_core as core;
pub use vigil_runtime as runtime;
pub use vigil_transport as transport;

pub use vigil_core::{
    BoxedListener, ConnectionState, Contact, DeliveryFailure, InboundPacket, ListenerError,
    ListenerResult, Message, MessageEvent, MessageListener, ProbeToken, SessionHandler,
    SessionTransport, TransportError, TransportResult, WatchdogConfig,
};
pub use vigil_runtime::{
    DeliveryReport, Escalation, PacketDisposition, ProtocolSession, RuntimeError, RuntimeResult,
    SessionStats, VigilConfig,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use vigil_core::prelude::*;
    pub use vigil_runtime::config::{ConfigLoader, load_config};
    pub use vigil_runtime::logging::{LoggingBuilder, init_from_config};
    pub use vigil_runtime::prelude::*;
    pub use vigil_runtime::{DeliveryReport, ProtocolSession, SessionStats};
}
