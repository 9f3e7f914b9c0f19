//! # Vigil Transport
//!
//! Concrete [`SessionTransport`](vigil_core::SessionTransport) implementations
//! for the Vigil messaging client, selected through feature flags.
//!
//! ## Features
//!
//! - `ws-client`: WebSocket client transport
//! - `full`: every transport
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  vigil-runtime      │  (ProtocolSession)
//! ├─────────────────────┤
//! │  vigil-core         │  (SessionTransport / SessionHandler)
//! ├─────────────────────┤
//! │  vigil-transport    │  <- This crate
//! ├─────────────────────┤
//! │  Network (TCP/TLS)  │
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_transport::websocket::{WsClientConfig, WsSessionTransport};
//!
//! let transport = Arc::new(WsSessionTransport::new(WsClientConfig::new("ws://127.0.0.1:9000")));
//! let session = ProtocolSession::builder("websocket")
//!     .transport(transport.clone())
//!     .build()?;
//! transport.connect(session.handler()).await?;
//! ```

pub mod frame;

#[cfg(feature = "ws-client")]
pub mod websocket;

pub use frame::{FrameError, decode_packet, encode_message};

#[cfg(feature = "ws-client")]
pub use websocket::{WsClientConfig, WsSessionTransport};
