//! Protocol session: the facade an adapter and its callers talk to.
//!
//! A [`ProtocolSession`] owns one fanout, one correlator and watchdog pair,
//! one reconnect policy and at most one watchdog timer. Adapters feed it
//! through [`ProtocolSession::handler`], a weak [`SessionHandler`] that never
//! keeps the session alive; callers subscribe listeners and send messages.
//!
//! ```rust,ignore
//! let session = ProtocolSession::builder("irc")
//!     .config(config.watchdog_for("irc"))
//!     .transport(transport.clone())
//!     .build()?;
//! transport.connect(session.handler()).await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{Instrument, Level, debug, info, span, trace, warn};
use vigil_core::{
    BoxedListener, BoxedSessionHandler, BoxedTransport, ConnectionState, Contact, CycleOutcome,
    DeliveryFailure, EventFanout, InboundPacket, LivenessWatchdog, Message, MessageEvent,
    ProbeCorrelator, SessionHandler, SessionId, SessionTransport, TransportError,
    TransportResult, WatchdogConfig, WatchdogPhase,
};

use crate::config::VigilConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::reconnect::{Escalation, ReconnectOutcome, ReconnectPolicy, ReconnectStats, ReconnectTarget};
use crate::timer::{TimerTicket, WatchdogTimer};

// =============================================================================
// Reports
// =============================================================================

/// What [`ProtocolSession::on_packet`] did with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDisposition {
    /// The echo matched the pending probe.
    EchoAccepted,
    /// The echo matched nothing and was dropped.
    EchoDiscarded,
    /// The packet was published; `handled` listeners accepted it cleanly.
    Dispatched { handled: usize },
    /// The session is closed.
    Dropped,
}

/// Result of [`ProtocolSession::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryReport {
    /// The transport accepted the message.
    Delivered { handled: usize },
    /// The message was not sent.
    Failed {
        failure: DeliveryFailure,
        handled: usize,
    },
}

impl DeliveryReport {
    /// Returns whether the message was delivered.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Point-in-time snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Session identifier.
    pub session: SessionId,
    /// Adapter name the session was built for.
    pub adapter: String,
    /// Current connection state.
    pub state: ConnectionState,
    /// Current watchdog phase.
    pub phase: WatchdogPhase,
    /// Consecutive failed liveness cycles.
    pub failures: u32,
    /// Times the failure threshold was reached.
    pub escalations: u64,
    /// Reconnect policy counters.
    pub reconnect: ReconnectStats,
    /// Probes handed to the transport.
    pub probes_sent: u64,
    /// Probes replaced before they were answered.
    pub probes_evicted: u64,
    /// Echoes that matched no pending probe.
    pub probes_discarded: u64,
    /// Subscribed listeners.
    pub listeners: usize,
    /// Listener callbacks that returned an error or panicked.
    pub listener_faults: u64,
    /// Messages the transport accepted.
    pub messages_delivered: u64,
    /// Messages reported as failed, sent or inbound.
    pub messages_failed: u64,
}

// =============================================================================
// Shared state
// =============================================================================

#[derive(Debug)]
struct SessionState {
    connection: ConnectionState,
    closed: bool,
}

#[derive(Debug, Default)]
struct Counters {
    probes_sent: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

struct SessionShared {
    id: SessionId,
    adapter: String,
    config: WatchdogConfig,
    me: Weak<SessionShared>,
    runtime: Handle,
    transport: BoxedTransport,
    fanout: EventFanout,
    watchdog: LivenessWatchdog,
    reconnect: Arc<ReconnectPolicy>,
    // Lock order: state, then timer.
    state: Mutex<SessionState>,
    timer: Mutex<Option<WatchdogTimer>>,
    epoch: AtomicU64,
    state_tx: watch::Sender<ConnectionState>,
    counters: Counters,
}

impl SessionShared {
    fn set_state(&self, state: &mut SessionState, next: ConnectionState) {
        if state.connection == next {
            return;
        }
        info!(
            session = %self.id,
            adapter = %self.adapter,
            old_state = %state.connection,
            new_state = %next,
            "Session state changed"
        );
        state.connection = next;
        self.state_tx.send_replace(next);
    }

    /// Replaces any running timer with a fresh one and a zeroed counter.
    fn start_watchdog(&self, _state: &SessionState) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.watchdog.reset();

        let weak = self.me.clone();
        let span = span!(Level::DEBUG, "watchdog", session = %self.id, adapter = %self.adapter);
        let timer = WatchdogTimer::spawn(&self.runtime, epoch, move |ticket| {
            watchdog_loop(weak, ticket).instrument(span)
        });
        debug!(session = %self.id, epoch, "Watchdog started");
        *self.timer.lock() = Some(timer);
    }

    fn stop_watchdog(&self, _state: &SessionState) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(timer) = self.timer.lock().take() {
            debug!(session = %self.id, epoch = timer.epoch(), "Watchdog stopped");
        }
        self.watchdog.reset();
    }

    fn is_current(&self, ticket: &TimerTicket) -> bool {
        !ticket.is_cancelled() && self.epoch.load(Ordering::SeqCst) == ticket.epoch()
    }

    fn is_registered(&self) -> bool {
        let state = self.state.lock();
        !state.closed && state.connection == ConnectionState::Registered
    }

    fn escalate(&self) -> Escalation {
        match self.me.upgrade() {
            Some(this) => self.reconnect.escalate(this),
            None => Escalation::Suppressed,
        }
    }

    // -------------------------------------------------------------------------
    // Adapter-facing
    // -------------------------------------------------------------------------

    fn on_registered(&self) {
        let mut state = self.state.lock();
        if state.closed {
            debug!(session = %self.id, "Registration after shutdown ignored");
            return;
        }
        self.set_state(&mut state, ConnectionState::Registered);
        self.start_watchdog(&state);
    }

    fn on_transport_error(&self, reason: &str) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        let current = state.connection;
        match current {
            ConnectionState::Registered => {
                warn!(session = %self.id, adapter = %self.adapter, reason, "Transport error");
                self.stop_watchdog(&state);
                self.set_state(&mut state, ConnectionState::Disconnected);
            }
            other => {
                debug!(session = %self.id, state = %other, reason, "Transport error ignored");
            }
        }
    }

    fn on_packet(&self, packet: InboundPacket) -> PacketDisposition {
        if self.state.lock().closed {
            trace!(session = %self.id, kind = packet.kind(), "Packet after shutdown dropped");
            return PacketDisposition::Dropped;
        }

        match packet {
            InboundPacket::ProbeEcho(token) => {
                if self.watchdog.correlator().try_resolve(token) {
                    self.watchdog.note_echo();
                    trace!(session = %self.id, token = %token, "Probe echo accepted");
                    PacketDisposition::EchoAccepted
                } else {
                    trace!(session = %self.id, token = %token, "Probe echo discarded");
                    PacketDisposition::EchoDiscarded
                }
            }
            InboundPacket::Received { from, message } => {
                let handled = self.fanout.publish(&MessageEvent::received(message, from));
                PacketDisposition::Dispatched { handled }
            }
            InboundPacket::DeliveryFailed {
                to,
                message,
                failure,
            } => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                let handled = self
                    .fanout
                    .publish(&MessageEvent::delivery_failed(message, to, failure));
                PacketDisposition::Dispatched { handled }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Caller-facing
    // -------------------------------------------------------------------------

    async fn send(&self, to: Contact, message: Message) -> DeliveryReport {
        if !self.is_registered() {
            debug!(session = %self.id, to = %to, "Send while not registered");
            return self.fail_delivery(message, to, DeliveryFailure::ProviderNotRegistered);
        }

        match self.transport.send_message(&to, &message).await {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                let handled = self.fanout.publish(&MessageEvent::delivered(message, to));
                DeliveryReport::Delivered { handled }
            }
            Err(e) => {
                warn!(session = %self.id, to = %to, error = %e, "Message send failed");
                self.count_send_failure();
                self.fail_delivery(message, to, delivery_failure_for(&e))
            }
        }
    }

    fn fail_delivery(&self, message: Message, to: Contact, failure: DeliveryFailure) -> DeliveryReport {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        let handled = self
            .fanout
            .publish(&MessageEvent::delivery_failed(message, to, failure));
        DeliveryReport::Failed { failure, handled }
    }

    /// A failed send counts as a failed liveness cycle while registered.
    fn count_send_failure(&self) {
        if !self.is_registered() {
            return;
        }
        if self.watchdog.record_failure() == CycleOutcome::Escalate {
            self.escalate();
        }
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        self.stop_watchdog(&state);
        self.set_state(&mut state, ConnectionState::Disconnected);
        info!(session = %self.id, adapter = %self.adapter, "Session shut down");
    }

    fn stats(&self) -> SessionStats {
        let correlator = self.watchdog.correlator().stats();
        SessionStats {
            session: self.id,
            adapter: self.adapter.clone(),
            state: self.state.lock().connection,
            phase: self.watchdog.phase(),
            failures: self.watchdog.failures(),
            escalations: self.watchdog.escalations(),
            reconnect: self.reconnect.stats(),
            probes_sent: self.counters.probes_sent.load(Ordering::Relaxed),
            probes_evicted: correlator.evicted,
            probes_discarded: correlator.discarded,
            listeners: self.fanout.listener_count(),
            listener_faults: self.fanout.fault_count(),
            messages_delivered: self.counters.delivered.load(Ordering::Relaxed),
            messages_failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

fn delivery_failure_for(error: &TransportError) -> DeliveryFailure {
    match error {
        TransportError::NotConnected => DeliveryFailure::ProviderNotRegistered,
        TransportError::InvalidConfig(_) => DeliveryFailure::Internal,
        _ => DeliveryFailure::NetworkFailure,
    }
}

#[async_trait]
impl ReconnectTarget for SessionShared {
    fn label(&self) -> String {
        format!("{}/{}", self.adapter, self.id)
    }

    fn begin_reconnect(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed || !state.connection.can_escalate() {
            return false;
        }
        self.stop_watchdog(&state);
        self.set_state(&mut state, ConnectionState::Reconnecting);
        true
    }

    async fn perform_reconnect(&self) -> TransportResult<()> {
        self.transport.perform_reconnect().await
    }

    fn complete_reconnect(&self, outcome: &ReconnectOutcome) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.connection != ConnectionState::Reconnecting {
            return false;
        }
        if outcome.is_success() {
            self.set_state(&mut state, ConnectionState::Registered);
            self.start_watchdog(&state);
        } else {
            self.set_state(&mut state, ConnectionState::Failed);
        }
        true
    }
}

fn live_session(session: &Weak<SessionShared>, ticket: &TimerTicket) -> Option<Arc<SessionShared>> {
    let shared = session.upgrade()?;
    shared.is_current(ticket).then_some(shared)
}

/// Drives one probe cycle after another until cancelled or superseded.
///
/// Only a `Weak` is held while sleeping.
async fn watchdog_loop(session: Weak<SessionShared>, ticket: TimerTicket) {
    let Some((interval, timeout)) = session
        .upgrade()
        .map(|s| (s.config.probe_interval, s.config.probe_timeout))
    else {
        return;
    };

    loop {
        if !ticket.sleep(interval).await {
            return;
        }

        let (probe, transport) = {
            let Some(shared) = live_session(&session, &ticket) else {
                return;
            };
            let probe = shared.watchdog.begin_cycle();
            shared.counters.probes_sent.fetch_add(1, Ordering::Relaxed);
            (probe, Arc::clone(&shared.transport))
        };

        trace!(token = %probe.token(), "Sending probe");
        let Some(sent) = ticket.run(transport.send_probe(probe.token())).await else {
            return;
        };
        drop(transport);

        let sent_ok = match sent {
            Ok(()) => true,
            Err(e) => {
                warn!(token = %probe.token(), error = %e, "Probe send failed");
                false
            }
        };
        if sent_ok && !ticket.sleep_past(probe.issued_at(), timeout).await {
            return;
        }

        let Some(shared) = live_session(&session, &ticket) else {
            return;
        };
        let outcome = if sent_ok {
            shared.watchdog.check()
        } else {
            shared.watchdog.probe_send_failed()
        };

        match outcome {
            CycleOutcome::Alive => trace!("Peer alive"),
            CycleOutcome::Missed { failures } => {
                info!(failures, threshold = shared.watchdog.threshold(), "Probe missed");
            }
            CycleOutcome::Escalate => {
                shared.escalate();
                return;
            }
        }
    }
}

// =============================================================================
// Handler link
// =============================================================================

/// Weak adapter-side handle to a session.
struct SessionLink {
    shared: Weak<SessionShared>,
}

impl SessionHandler for SessionLink {
    fn on_registered(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_registered();
        }
    }

    fn on_packet(&self, packet: InboundPacket) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_packet(packet);
        }
    }

    fn on_transport_error(&self, reason: &str) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_transport_error(reason);
        }
    }
}

// =============================================================================
// ProtocolSession
// =============================================================================

/// Builder for [`ProtocolSession`].
pub struct SessionBuilder {
    adapter: String,
    config: WatchdogConfig,
    transport: Option<BoxedTransport>,
    runtime: Option<Handle>,
}

impl SessionBuilder {
    /// Sets the watchdog configuration.
    pub fn config(mut self, config: WatchdogConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses the watchdog settings `config` resolves for this adapter.
    pub fn config_from(mut self, config: &VigilConfig) -> Self {
        self.config = config.watchdog_for(&self.adapter);
        self
    }

    /// Sets the transport the session sends through.
    pub fn transport<T: SessionTransport + 'static>(mut self, transport: Arc<T>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the runtime the watchdog and reconnect tasks run on.
    ///
    /// Defaults to the runtime `build` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the session in the `Disconnected` state.
    ///
    /// Once built, the adapter may call into the session from any thread.
    pub fn build(self) -> RuntimeResult<ProtocolSession> {
        let transport = self
            .transport
            .ok_or_else(|| RuntimeError::MissingTransport(self.adapter.clone()))?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()
                .map_err(|_| RuntimeError::NoRuntime(self.adapter.clone()))?,
        };

        let id = SessionId::next();
        let correlator = Arc::new(ProbeCorrelator::for_session(id));
        let watchdog = LivenessWatchdog::new(correlator, self.config.effective_threshold());
        let reconnect = Arc::new(
            ReconnectPolicy::new(self.config.reconnect_timeout).on_runtime(runtime.clone()),
        );
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        info!(
            session = %id,
            adapter = %self.adapter,
            transport = transport.name(),
            probe_interval = ?self.config.probe_interval,
            probe_timeout = ?self.config.probe_timeout,
            threshold = watchdog.threshold(),
            "Session created"
        );

        let shared = Arc::new_cyclic(|me| SessionShared {
            id,
            adapter: self.adapter,
            config: self.config,
            me: me.clone(),
            runtime,
            transport,
            fanout: EventFanout::new(),
            watchdog,
            reconnect,
            state: Mutex::new(SessionState {
                connection: ConnectionState::Disconnected,
                closed: false,
            }),
            timer: Mutex::new(None),
            epoch: AtomicU64::new(0),
            state_tx,
            counters: Counters::default(),
        });

        Ok(ProtocolSession { shared })
    }
}

/// A monitored connection to one messaging provider.
///
/// Dropping the session shuts it down.
pub struct ProtocolSession {
    shared: Arc<SessionShared>,
}

impl ProtocolSession {
    /// Starts building a session for `adapter`.
    pub fn builder(adapter: impl Into<String>) -> SessionBuilder {
        SessionBuilder {
            adapter: adapter.into(),
            config: WatchdogConfig::default(),
            transport: None,
            runtime: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn adapter(&self) -> &str {
        &self.shared.adapter
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.shared.config
    }

    /// Returns a handler the adapter can hold without keeping the session alive.
    pub fn handler(&self) -> BoxedSessionHandler {
        Arc::new(SessionLink {
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// The adapter finished registration; (re)starts monitoring.
    ///
    /// Accepted from any state, including `Failed`.
    pub fn on_registered(&self) {
        self.shared.on_registered();
    }

    /// Routes an inbound packet.
    pub fn on_packet(&self, packet: InboundPacket) -> PacketDisposition {
        self.shared.on_packet(packet)
    }

    /// The transport dropped underneath the session.
    pub fn on_transport_error(&self, reason: &str) {
        self.shared.on_transport_error(reason);
    }

    pub fn subscribe(&self, listener: BoxedListener) -> bool {
        self.shared.fanout.subscribe(listener)
    }

    pub fn unsubscribe(&self, listener: &BoxedListener) -> bool {
        self.shared.fanout.unsubscribe(listener)
    }

    /// Sends `message` to `to` and publishes the result to listeners.
    pub async fn send(&self, to: Contact, message: Message) -> DeliveryReport {
        self.shared.send(to, message).await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.lock().connection
    }

    /// Returns a receiver that observes every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats()
    }

    /// Forces a reconnect as if the watchdog had escalated.
    pub fn escalate(&self) -> RuntimeResult<Escalation> {
        if self.is_closed() {
            return Err(RuntimeError::SessionClosed(self.shared.label()));
        }
        Ok(self.shared.escalate())
    }

    /// Stops monitoring for good. Idempotent.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl Drop for ProtocolSession {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl std::fmt::Debug for ProtocolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("id", &self.shared.id)
            .field("adapter", &self.shared.adapter)
            .field("state", &self.connection_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use std::time::Duration;
    use vigil_core::{
        ListenerResult, MessageDelivered, MessageDeliveryFailed, MessageListener, ProbeToken,
    };

    /// Scripted transport that records probes and can echo them back.
    #[derive(Default)]
    struct MockTransport {
        handler: Mutex<Option<BoxedSessionHandler>>,
        probes: Mutex<Vec<ProbeToken>>,
        echo: AtomicBool,
        fail_probes: AtomicBool,
        fail_sends: AtomicBool,
        fail_reconnect: AtomicBool,
        sent: AtomicU32,
        reconnects: AtomicU32,
    }

    impl MockTransport {
        fn new(echo: bool) -> Arc<Self> {
            let mock = Self::default();
            mock.echo.store(echo, Ordering::SeqCst);
            Arc::new(mock)
        }

        fn attach(&self, handler: BoxedSessionHandler) {
            *self.handler.lock() = Some(handler);
        }

        fn probes(&self) -> Vec<ProbeToken> {
            self.probes.lock().clone()
        }
    }

    #[async_trait]
    impl SessionTransport for MockTransport {
        fn name(&self) -> &str {
            "mock"
        }

        async fn send_probe(&self, token: ProbeToken) -> TransportResult<()> {
            self.probes.lock().push(token);
            if self.fail_probes.load(Ordering::SeqCst) {
                return Err(TransportError::send("probe refused"));
            }
            if self.echo.load(Ordering::SeqCst) {
                let handler = self.handler.lock().clone();
                if let Some(handler) = handler {
                    handler.on_packet(InboundPacket::ProbeEcho(token));
                }
            }
            Ok(())
        }

        async fn send_message(&self, _to: &Contact, _message: &Message) -> TransportResult<()> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportError::send("socket closed"));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn perform_reconnect(&self) -> TransportResult<()> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            if self.fail_reconnect.load(Ordering::SeqCst) {
                Err(TransportError::ConnectionFailed {
                    url: "mock://".to_string(),
                    reason: "refused".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        delivered: AtomicU32,
        failed: Mutex<Vec<DeliveryFailure>>,
    }

    impl MessageListener for RecordingListener {
        fn on_delivered(&self, _event: &MessageDelivered) -> ListenerResult {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_delivery_failed(&self, event: &MessageDeliveryFailed) -> ListenerResult {
            self.failed.lock().push(event.failure);
            Ok(())
        }
    }

    fn session_with(mock: &Arc<MockTransport>, config: WatchdogConfig) -> ProtocolSession {
        let session = ProtocolSession::builder("mock")
            .config(config)
            .transport(mock.clone())
            .build()
            .unwrap();
        mock.attach(session.handler());
        session
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[test]
    fn test_build_requires_transport() {
        let result = ProtocolSession::builder("irc").build();
        assert!(matches!(result, Err(RuntimeError::MissingTransport(name)) if name == "irc"));
    }

    #[test]
    fn test_build_outside_runtime_needs_handle() {
        let mock = MockTransport::new(true);
        let result = ProtocolSession::builder("irc")
            .transport(mock.clone())
            .build();
        assert!(matches!(result, Err(RuntimeError::NoRuntime(name)) if name == "irc"));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let session = ProtocolSession::builder("irc")
            .transport(mock)
            .runtime(runtime.handle().clone())
            .build()
            .unwrap();
        session.on_registered();
        assert_eq!(session.connection_state(), ConnectionState::Registered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_from_adapter_thread_starts_monitoring() {
        let mock = MockTransport::new(false);
        let session = session_with(&mock, WatchdogConfig::default());

        let handler = session.handler();
        std::thread::spawn(move || handler.on_registered())
            .join()
            .unwrap();
        assert_eq!(session.connection_state(), ConnectionState::Registered);

        advance(601).await;
        let stats = session.stats();
        assert_eq!(stats.probes_sent, 3);
        assert_eq!(stats.escalations, 1);
        assert_eq!(stats.reconnect.started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalate_from_adapter_thread() {
        let mock = MockTransport::new(false);
        let session = session_with(&mock, WatchdogConfig::default());
        session.on_registered();

        let started = std::thread::scope(|scope| {
            scope
                .spawn(|| session.escalate().unwrap().is_started())
                .join()
                .unwrap()
        });
        assert!(started);
        assert_eq!(session.connection_state(), ConnectionState::Reconnecting);

        advance(6).await;
        assert_eq!(session.connection_state(), ConnectionState::Registered);
        assert_eq!(mock.reconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_probe_timeout_keeps_watchdog_alive() {
        let mock = MockTransport::new(false);
        let config = WatchdogConfig::default()
            .with_probe_interval(Duration::from_secs(1))
            .with_probe_timeout(Duration::MAX);
        let session = session_with(&mock, config);
        session.on_registered();

        advance(5).await;
        let stats = session.stats();
        assert_eq!(stats.probes_sent, 1);
        assert_eq!(stats.phase, WatchdogPhase::ProbeSent);
        let running = session
            .shared
            .timer
            .lock()
            .as_ref()
            .map(|timer| !timer.is_finished());
        assert_eq!(running, Some(true));

        session.shutdown();
        assert!(session.shared.timer.lock().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_peer_never_escalates() {
        let mock = MockTransport::new(true);
        let session = session_with(&mock, WatchdogConfig::default());
        session.on_registered();

        // Checks at 200, 400 and 600 seconds.
        advance(601).await;

        let stats = session.stats();
        assert_eq!(mock.probes().len(), 3);
        assert_eq!(stats.state, ConnectionState::Registered);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.escalations, 0);
        assert_eq!(stats.probes_sent, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_escalates_once_and_recovers() {
        let mock = MockTransport::new(false);
        let session = session_with(&mock, WatchdogConfig::default());
        let mut changes = session.state_changes();
        session.on_registered();
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), ConnectionState::Registered);

        advance(201).await;
        assert_eq!(session.stats().failures, 1);
        advance(200).await;
        assert_eq!(session.stats().failures, 2);

        // Third miss at 600 seconds; reconnect takes 5 seconds.
        advance(200).await;
        assert_eq!(session.connection_state(), ConnectionState::Reconnecting);
        assert_eq!(mock.reconnects.load(Ordering::SeqCst), 1);

        advance(10).await;
        let stats = session.stats();
        assert_eq!(stats.state, ConnectionState::Registered);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.escalations, 1);
        assert_eq!(stats.reconnect.started, 1);
        assert_eq!(mock.probes().len(), 3);

        // Monitoring restarted from the reconnect.
        advance(180).await;
        assert_eq!(mock.probes().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_echo_is_rejected() {
        let mock = MockTransport::new(false);
        let session = session_with(&mock, WatchdogConfig::default());
        session.on_registered();

        advance(201).await;
        let token = mock.probes()[0];
        assert_eq!(session.stats().failures, 1);

        assert_eq!(
            session.on_packet(InboundPacket::ProbeEcho(token)),
            PacketDisposition::EchoDiscarded
        );
        assert_eq!(session.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_probe_resets_counter() {
        let mock = MockTransport::new(false);
        let session = session_with(&mock, WatchdogConfig::default());
        session.on_registered();

        advance(401).await;
        assert_eq!(session.stats().failures, 2);

        mock.echo.store(true, Ordering::SeqCst);
        advance(200).await;
        let stats = session.stats();
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.state, ConnectionState::Registered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reconnect_waits_for_registration() {
        let mock = MockTransport::new(false);
        mock.fail_reconnect.store(true, Ordering::SeqCst);
        let session = session_with(&mock, WatchdogConfig::default());
        session.on_registered();

        advance(610).await;
        assert_eq!(session.connection_state(), ConnectionState::Failed);
        assert_eq!(session.stats().reconnect.failed, 1);

        // No probes and no further attempts while failed.
        advance(1000).await;
        assert_eq!(mock.probes().len(), 3);
        assert!(!session.escalate().unwrap().is_started());
        assert_eq!(mock.reconnects.load(Ordering::SeqCst), 1);

        session.on_registered();
        assert_eq!(session.connection_state(), ConnectionState::Registered);
        advance(181).await;
        assert_eq!(mock.probes().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_send_failure_counts() {
        let mock = MockTransport::new(true);
        mock.fail_probes.store(true, Ordering::SeqCst);
        let session = session_with(&mock, WatchdogConfig::default());
        session.on_registered();

        // A refused probe fails immediately, without waiting for the timeout.
        advance(181).await;
        assert_eq!(session.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_stops_monitoring() {
        let mock = MockTransport::new(true);
        let session = session_with(&mock, WatchdogConfig::default());
        session.on_registered();

        session.on_transport_error("connection reset");
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);

        advance(1000).await;
        assert!(mock.probes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_ignored_while_reconnecting() {
        let mock = MockTransport::new(false);
        let session = session_with(&mock, WatchdogConfig::default());
        session.on_registered();

        assert!(session.escalate().unwrap().is_started());
        session.on_transport_error("old socket closed");
        assert_eq!(session.connection_state(), ConnectionState::Reconnecting);

        advance(6).await;
        assert_eq!(session.connection_state(), ConnectionState::Registered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_unregistered_fails_fast() {
        let mock = MockTransport::new(true);
        let session = session_with(&mock, WatchdogConfig::default());
        let listener = Arc::new(RecordingListener::default());
        session.subscribe(listener.clone());

        let report = session
            .send(Contact::new("alice"), Message::text("hi"))
            .await;
        assert_eq!(
            report,
            DeliveryReport::Failed {
                failure: DeliveryFailure::ProviderNotRegistered,
                handled: 1
            }
        );
        assert_eq!(mock.sent.load(Ordering::SeqCst), 0);
        assert_eq!(
            *listener.failed.lock(),
            vec![DeliveryFailure::ProviderNotRegistered]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_publishes_delivery() {
        let mock = MockTransport::new(true);
        let session = session_with(&mock, WatchdogConfig::default());
        let listener = Arc::new(RecordingListener::default());
        session.subscribe(listener.clone());
        session.on_registered();

        let report = session
            .send(Contact::new("alice"), Message::text("hi"))
            .await;
        assert!(report.is_delivered());
        assert_eq!(listener.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(session.stats().messages_delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_counts_toward_escalation() {
        let mock = MockTransport::new(true);
        mock.fail_sends.store(true, Ordering::SeqCst);
        let config = WatchdogConfig::default().with_failure_threshold(2);
        let session = session_with(&mock, config);
        let listener = Arc::new(RecordingListener::default());
        session.subscribe(listener.clone());
        session.on_registered();

        let report = session.send(Contact::new("bob"), Message::text("1")).await;
        assert_eq!(
            report,
            DeliveryReport::Failed {
                failure: DeliveryFailure::NetworkFailure,
                handled: 1
            }
        );
        assert_eq!(session.stats().failures, 1);

        session.send(Contact::new("bob"), Message::text("2")).await;
        assert_eq!(session.connection_state(), ConnectionState::Reconnecting);
        assert_eq!(listener.failed.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_monitoring() {
        let mock = MockTransport::new(true);
        let session = session_with(&mock, WatchdogConfig::default());
        session.on_registered();

        session.shutdown();
        assert!(session.is_closed());
        assert!(matches!(
            session.escalate(),
            Err(RuntimeError::SessionClosed(_))
        ));

        // Late registration from the adapter cannot revive it.
        session.on_registered();
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);

        advance(1000).await;
        assert!(mock.probes().is_empty());
        assert_eq!(
            session.on_packet(InboundPacket::Received {
                from: Contact::new("carol"),
                message: Message::text("still there?"),
            }),
            PacketDisposition::Dropped
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_timer_and_detaches_handler() {
        let mock = MockTransport::new(true);
        let session = session_with(&mock, WatchdogConfig::default());
        session.on_registered();
        let handler = session.handler();

        drop(session);
        advance(1000).await;
        assert!(mock.probes().is_empty());

        // The adapter's handle outlives the session harmlessly.
        handler.on_registered();
        handler.on_transport_error("gone");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_reconnect_is_final() {
        let mock = MockTransport::new(false);
        let session = session_with(&mock, WatchdogConfig::default());
        session.on_registered();

        let Escalation::Started(task) = session.escalate().unwrap() else {
            panic!("escalation should start a reconnect");
        };
        session.shutdown();

        assert!(task.await.unwrap().is_success());
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        advance(1000).await;
        assert!(mock.probes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_packets_reach_listeners() {
        struct Inbox(Mutex<Vec<String>>);
        impl MessageListener for Inbox {
            fn on_received(&self, event: &vigil_core::MessageReceived) -> ListenerResult {
                self.0.lock().push(event.message.content.clone());
                Ok(())
            }
        }

        let mock = MockTransport::new(true);
        let session = session_with(&mock, WatchdogConfig::default());
        let inbox = Arc::new(Inbox(Mutex::new(Vec::new())));
        session.subscribe(inbox.clone());

        let handler = session.handler();
        handler.on_packet(InboundPacket::Received {
            from: Contact::new("dave"),
            message: Message::text("ping"),
        });
        assert_eq!(*inbox.0.lock(), vec!["ping".to_string()]);
    }
}
