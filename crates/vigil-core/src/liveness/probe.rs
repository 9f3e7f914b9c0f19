//! Liveness probes and echo correlation.
//!
//! Every session owns one [`ProbeCorrelator`]. Tokens are namespaced by a
//! process-wide session number, so an echo that was meant for another session
//! sharing the same physical connection is rejected without any shared
//! locking.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Maximum number of probes awaiting an echo.
pub const PENDING_CAPACITY: usize = 1;

static NEXT_SESSION: AtomicU32 = AtomicU32::new(1);

/// Process-unique number identifying one logical session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u32);

impl SessionId {
    /// Allocates the next session number.
    pub fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw number.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Opaque 64-bit correlation token carried by a probe and its echo.
///
/// The high half is the issuing [`SessionId`], the low half a per-session
/// sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeToken(u64);

impl ProbeToken {
    fn compose(session: SessionId, sequence: u32) -> Self {
        Self((u64::from(session.0) << 32) | u64::from(sequence))
    }

    /// Rebuilds a token from its raw value (e.g. parsed from an echo).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value to embed in an outbound probe.
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Returns the session that issued this token.
    pub fn session_id(&self) -> SessionId {
        SessionId((self.0 >> 32) as u32)
    }

    /// Returns the per-session sequence number.
    pub fn sequence(&self) -> u32 {
        self.0 as u32
    }

    /// Big-endian wire form.
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Parses the big-endian wire form; `None` unless exactly 8 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_be_bytes(raw)))
    }
}

impl fmt::Display for ProbeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    token: ProbeToken,
    issued_at: Instant,
}

impl Probe {
    /// Returns the correlation token.
    pub fn token(&self) -> ProbeToken {
        self.token
    }

    /// Returns when the probe was issued.
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }
}

#[derive(Debug)]
struct CorrelatorState {
    pending: VecDeque<Probe>,
    next_sequence: u32,
    resolved: Option<ProbeToken>,
    evicted: u64,
    discarded: u64,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    /// Probes still awaiting an echo.
    pub pending: usize,
    /// Probes dropped because a newer probe was issued.
    pub evicted: u64,
    /// Echoes that matched nothing.
    pub discarded: u64,
}

/// Issues probes and matches echoes against the pending queue.
#[derive(Debug)]
pub struct ProbeCorrelator {
    session: SessionId,
    state: Mutex<CorrelatorState>,
}

impl ProbeCorrelator {
    /// Creates a correlator with a freshly allocated session namespace.
    pub fn new() -> Self {
        Self::for_session(SessionId::next())
    }

    /// Creates a correlator for an already allocated session.
    pub fn for_session(session: SessionId) -> Self {
        Self {
            session,
            state: Mutex::new(CorrelatorState {
                pending: VecDeque::with_capacity(PENDING_CAPACITY),
                next_sequence: 1,
                resolved: None,
                evicted: 0,
                discarded: 0,
            }),
        }
    }

    /// Returns the session namespace of this correlator.
    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Creates a fresh probe and queues it, evicting any older pending probe.
    pub fn issue(&self) -> Probe {
        let mut state = self.state.lock();

        let sequence = state.next_sequence;
        state.next_sequence = match sequence.wrapping_add(1) {
            0 => 1,
            next => next,
        };

        while state.pending.len() >= PENDING_CAPACITY {
            if let Some(old) = state.pending.pop_front() {
                state.evicted += 1;
                trace!(session = %self.session, token = %old.token, "Evicted unanswered probe");
            }
        }

        let probe = Probe {
            token: ProbeToken::compose(self.session, sequence),
            issued_at: Instant::now(),
        };
        state.pending.push_back(probe);
        probe
    }

    /// Accepts an echo if it matches the head of the pending queue.
    ///
    /// Returns `false` for foreign, stale, duplicate or unsolicited echoes;
    /// those are discarded without further effect.
    pub fn try_resolve(&self, token: ProbeToken) -> bool {
        let mut state = self.state.lock();
        match state.pending.front() {
            None => {
                trace!(session = %self.session, token = %token, "Probe echo with nothing pending");
                false
            }
            Some(_) if token.session_id() != self.session => {
                state.discarded += 1;
                debug!(session = %self.session, token = %token, "Discarded foreign probe echo");
                false
            }
            Some(head) if head.token == token => {
                state.pending.pop_front();
                state.resolved = Some(token);
                trace!(session = %self.session, token = %token, "Probe echo matched");
                true
            }
            Some(_) => {
                state.discarded += 1;
                trace!(session = %self.session, token = %token, "Discarded stale probe echo");
                false
            }
        }
    }

    /// Returns whether `token` was resolved by an echo.
    pub fn is_resolved(&self, token: ProbeToken) -> bool {
        self.state.lock().resolved == Some(token)
    }

    /// Drops `token` from the pending queue once its wait window has closed.
    pub fn expire(&self, token: ProbeToken) -> bool {
        let mut state = self.state.lock();
        if state.pending.front().is_some_and(|p| p.token == token) {
            state.pending.pop_front();
            true
        } else {
            false
        }
    }

    /// Returns diagnostic counters.
    pub fn stats(&self) -> CorrelatorStats {
        let state = self.state.lock();
        CorrelatorStats {
            pending: state.pending.len(),
            evicted: state.evicted,
            discarded: state.discarded,
        }
    }
}

impl Default for ProbeCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
