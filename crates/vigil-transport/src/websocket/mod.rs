//! WebSocket transport.

#[cfg(feature = "ws-client")]
mod client;
#[cfg(feature = "ws-client")]
pub use client::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_OUTBOUND_CAPACITY, WsClientConfig, WsSessionTransport,
};
