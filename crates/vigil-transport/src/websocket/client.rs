//! WebSocket client transport for a protocol session.
//!
//! Each dialed connection gets its own loop task that owns the socket. The
//! transport talks to the loop through a bounded channel; every outbound
//! frame carries a oneshot so callers learn whether the write succeeded.
//!
//! Liveness probes are WebSocket pings whose payload is the 8-byte big-endian
//! probe token. Pongs are decoded back into [`InboundPacket::ProbeEcho`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, info, span, trace, warn};

use vigil_core::{
    BoxedSessionHandler, Contact, InboundPacket, Message, ProbeToken, SessionTransport,
    TransportError, TransportResult,
};

use crate::frame::{decode_packet, encode_message};

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default depth of the outbound frame queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Settings for [`WsSessionTransport`].
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// Server URL, `ws://` or `wss://`.
    pub url: String,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Outbound queue depth.
    pub outbound_capacity: usize,
}

impl WsClientConfig {
    /// Creates a config for `url` with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }

    /// Sets the handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Checks the URL scheme.
    pub fn validate(&self) -> TransportResult<()> {
        if self.url.starts_with("ws://") || self.url.starts_with("wss://") {
            Ok(())
        } else {
            Err(TransportError::InvalidConfig(format!(
                "WebSocket URL must start with ws:// or wss://, got '{}'",
                self.url
            )))
        }
    }
}

/// A frame queued for the connection loop.
struct Outbound {
    frame: WsMessage,
    ack: oneshot::Sender<TransportResult<()>>,
}

/// The live connection, as seen from the transport.
struct Connection {
    generation: u64,
    outbound: mpsc::Sender<Outbound>,
    shutdown: CancellationToken,
}

/// Session transport over a single WebSocket connection.
pub struct WsSessionTransport {
    config: WsClientConfig,
    handler: Mutex<Option<BoxedSessionHandler>>,
    connection: Mutex<Option<Connection>>,
    generation: AtomicU64,
}

impl WsSessionTransport {
    /// Creates an unconnected transport.
    pub fn new(config: WsClientConfig) -> Self {
        Self {
            config,
            handler: Mutex::new(None),
            connection: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the configured URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Dials the server and reports registration to `handler`.
    ///
    /// The handler also receives every inbound packet and any transport
    /// failure of this and later connections.
    pub async fn connect(&self, handler: BoxedSessionHandler) -> TransportResult<()> {
        *self.handler.lock() = Some(handler.clone());
        self.dial(handler.clone()).await?;
        handler.on_registered();
        Ok(())
    }

    /// Closes the current connection, if any.
    pub fn close(&self) {
        if let Some(conn) = self.connection.lock().take() {
            debug!(url = %self.config.url, generation = conn.generation, "Closing WebSocket connection");
            conn.shutdown.cancel();
        }
    }

    /// Returns whether a connection loop is running.
    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .is_some_and(|conn| !conn.outbound.is_closed())
    }

    async fn dial(&self, handler: BoxedSessionHandler) -> TransportResult<()> {
        self.config.validate()?;
        let url = self.config.url.clone();

        info!(url = %url, "Connecting to WebSocket server");
        let (ws_stream, _response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| TransportError::ConnectionFailed {
                    url: url.clone(),
                    reason: format!("WebSocket connection failed: {e}"),
                })?;
        let (ws_tx, ws_rx) = ws_stream.split();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let shutdown = CancellationToken::new();

        let previous = self.connection.lock().replace(Connection {
            generation,
            outbound: outbound_tx,
            shutdown: shutdown.clone(),
        });
        if let Some(previous) = previous {
            previous.shutdown.cancel();
        }

        info!(url = %url, generation, "WebSocket client connected");

        let span = span!(Level::DEBUG, "ws_client", url = %url, generation);
        tokio::spawn(
            run_client_loop(ws_tx, ws_rx, outbound_rx, shutdown, handler).instrument(span),
        );
        Ok(())
    }

    async fn enqueue(&self, frame: WsMessage) -> TransportResult<()> {
        let outbound = self
            .connection
            .lock()
            .as_ref()
            .map(|conn| conn.outbound.clone())
            .ok_or(TransportError::NotConnected)?;

        let (ack, done) = oneshot::channel();
        outbound
            .send(Outbound { frame, ack })
            .await
            .map_err(|_| TransportError::NotConnected)?;
        done.await.map_err(|_| TransportError::NotConnected)?
    }
}

#[async_trait]
impl SessionTransport for WsSessionTransport {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn send_probe(&self, token: ProbeToken) -> TransportResult<()> {
        trace!(token = %token, "Sending ping probe");
        self.enqueue(WsMessage::Ping(token.to_bytes().to_vec().into()))
            .await
    }

    async fn send_message(&self, to: &Contact, message: &Message) -> TransportResult<()> {
        let text = encode_message(to, message).map_err(|e| TransportError::send(e.to_string()))?;
        self.enqueue(WsMessage::Text(text.into())).await
    }

    async fn perform_reconnect(&self) -> TransportResult<()> {
        let handler = self
            .handler
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        self.close();
        self.dial(handler).await
    }
}

impl Drop for WsSessionTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns one socket until it fails or is shut down.
///
/// Failures are reported to the handler; a shutdown requested by the
/// transport is not.
async fn run_client_loop<S, R>(
    mut ws_tx: S,
    mut ws_rx: R,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    shutdown: CancellationToken,
    handler: BoxedSessionHandler,
) where
    S: Sink<WsMessage, Error = WsError> + Unpin,
    R: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    let reason = loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("WebSocket client shutting down");
                let _ = ws_tx.close().await;
                return;
            }

            Some(Outbound { frame, ack }) = outbound_rx.recv() => {
                let result = ws_tx
                    .send(frame)
                    .await
                    .map_err(|e| TransportError::send(e.to_string()));
                let failed = result.as_ref().err().map(ToString::to_string);
                let _ = ack.send(result);
                if let Some(reason) = failed {
                    break reason;
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        trace!(len = text.len(), "Received text");
                        match decode_packet(text.as_str()) {
                            Ok(packet) => handler.on_packet(packet),
                            Err(e) => warn!(error = %e, "Dropping undecodable frame"),
                        }
                    }
                    Some(Ok(WsMessage::Pong(data))) => {
                        match ProbeToken::from_bytes(&data) {
                            Some(token) => handler.on_packet(InboundPacket::ProbeEcho(token)),
                            None => trace!(len = data.len(), "Ignoring pong without probe token"),
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        trace!("Received ping, sending pong");
                        if let Err(e) = ws_tx.send(WsMessage::Pong(data)).await {
                            break format!("WebSocket pong failed: {e}");
                        }
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        trace!(len = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        break frame
                            .map(|f| format!("server closed connection: {}", f.reason))
                            .unwrap_or_else(|| "server closed connection".to_string());
                    }
                    Some(Ok(WsMessage::Frame(_))) => {}
                    Some(Err(e)) => break format!("WebSocket error: {e}"),
                    None => break "WebSocket stream ended".to_string(),
                }
            }
        }
    };

    if shutdown.is_cancelled() {
        return;
    }
    shutdown.cancel();
    info!(reason = %reason, "WebSocket connection lost");
    handler.on_transport_error(&reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingHandler {
        packets: Mutex<Vec<InboundPacket>>,
        errors: Mutex<Vec<String>>,
    }

    impl vigil_core::SessionHandler for RecordingHandler {
        fn on_registered(&self) {}

        fn on_packet(&self, packet: InboundPacket) {
            self.packets.lock().push(packet);
        }

        fn on_transport_error(&self, reason: &str) {
            self.errors.lock().push(reason.to_string());
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(WsClientConfig::new("ws://127.0.0.1:9000").validate().is_ok());
        assert!(WsClientConfig::new("wss://chat.example.org").validate().is_ok());
        assert!(matches!(
            WsClientConfig::new("http://example.org").validate(),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let transport = WsSessionTransport::new(WsClientConfig::new("ws://127.0.0.1:1"));
        assert!(!transport.is_connected());

        let result = transport
            .send_message(&Contact::new("alice"), &Message::text("hi"))
            .await;
        assert!(matches!(result, Err(TransportError::NotConnected)));

        let result = transport.perform_reconnect().await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_dialing() {
        let transport = WsSessionTransport::new(WsClientConfig::new("tcp://nowhere"));
        let result = transport
            .connect(Arc::new(RecordingHandler::default()))
            .await;
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_pong_routes_echo_and_stream_end_is_reported() {
        let token = ProbeToken::from_raw(0x0000_0002_0000_0005);
        let sink = futures::sink::drain::<WsMessage>().sink_map_err(|e: Infallible| match e {});
        let source = futures::stream::iter([Ok::<_, WsError>(WsMessage::Pong(
            token.to_bytes().to_vec().into(),
        ))]);
        let (_outbound_tx, outbound_rx) = mpsc::channel(1);
        let handler = Arc::new(RecordingHandler::default());

        run_client_loop(sink, source, outbound_rx, CancellationToken::new(), handler.clone()).await;

        assert!(matches!(
            handler.packets.lock().as_slice(),
            [InboundPacket::ProbeEcho(echo)] if *echo == token
        ));
        assert_eq!(*handler.errors.lock(), vec!["WebSocket stream ended".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_pong_write_ends_connection() {
        let sink = Box::pin(futures::sink::unfold((), |(), _frame: WsMessage| async {
            Err::<(), _>(WsError::ConnectionClosed)
        }));
        let source = futures::stream::iter([Ok::<_, WsError>(WsMessage::Ping(vec![1u8, 2].into()))])
            .chain(futures::stream::pending());
        let (_outbound_tx, outbound_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let handler = Arc::new(RecordingHandler::default());

        run_client_loop(sink, source, outbound_rx, shutdown.clone(), handler.clone()).await;

        let errors = handler.errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("WebSocket pong failed"));
        assert!(shutdown.is_cancelled());
    }
}
