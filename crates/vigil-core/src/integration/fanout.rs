//! Listener registry and event fanout.
//!
//! Registration changes take a short-held lock; [`EventFanout::publish`]
//! copies the listener list under that lock and dispatches outside it, so a
//! listener may subscribe or unsubscribe (itself included) from inside its own
//! callback without deadlocking or disturbing the in-flight event.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{Level, span, trace, warn};

use crate::foundation::error::ListenerResult;
use crate::foundation::event::{
    MessageDelivered, MessageDeliveryFailed, MessageEvent, MessageReceived,
};

/// Receives message events from a session.
///
/// Callbacks run on whichever task published the event and should return
/// quickly. Every method defaults to doing nothing, so a listener only
/// overrides the kinds it cares about.
pub trait MessageListener: Send + Sync {
    /// A sent message was handed to the transport.
    fn on_delivered(&self, _event: &MessageDelivered) -> ListenerResult {
        Ok(())
    }

    /// A message arrived.
    fn on_received(&self, _event: &MessageReceived) -> ListenerResult {
        Ok(())
    }

    /// A message could not be delivered.
    fn on_delivery_failed(&self, _event: &MessageDeliveryFailed) -> ListenerResult {
        Ok(())
    }
}

/// Shared listener handle. Identity is the allocation it points to.
pub type BoxedListener = Arc<dyn MessageListener>;

fn same_listener(a: &BoxedListener, b: &BoxedListener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Thread-safe multi-listener dispatcher.
#[derive(Default)]
pub struct EventFanout {
    listeners: Mutex<Vec<BoxedListener>>,
    faults: AtomicU64,
}

impl EventFanout {
    /// Creates an empty fanout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `listener` unless it is already subscribed.
    ///
    /// Returns `true` if it was added.
    pub fn subscribe(&self, listener: BoxedListener) -> bool {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Removes `listener` if present.
    ///
    /// Returns `true` if it was removed.
    pub fn unsubscribe(&self, listener: &BoxedListener) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    /// Delivers `event` to every listener subscribed at call time, in
    /// subscription order.
    ///
    /// A listener that errors or panics is logged and skipped; the remaining
    /// listeners still receive the event. Returns the number of listeners that
    /// handled it cleanly.
    pub fn publish(&self, event: &MessageEvent) -> usize {
        let snapshot: Vec<BoxedListener> = self.listeners.lock().clone();

        let span = span!(Level::TRACE, "publish", kind = event.kind(), listeners = snapshot.len());
        let _enter = span.enter();

        let mut delivered = 0;
        for (index, listener) in snapshot.iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| Self::deliver(listener, event)));
            match result {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    self.faults.fetch_add(1, Ordering::Relaxed);
                    warn!(listener = index, kind = event.kind(), error = %e, "Listener returned an error");
                }
                Err(panic) => {
                    self.faults.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        listener = index,
                        kind = event.kind(),
                        panic = panic_message(panic.as_ref()),
                        "Listener panicked"
                    );
                }
            }
        }

        trace!(delivered, "Event published");
        delivered
    }

    /// Returns the number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Returns how many listener callbacks have failed so far.
    pub fn fault_count(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    fn deliver(listener: &BoxedListener, event: &MessageEvent) -> ListenerResult {
        match event {
            MessageEvent::Delivered(e) => listener.on_delivered(e),
            MessageEvent::Received(e) => listener.on_received(e),
            MessageEvent::DeliveryFailed(e) => listener.on_delivery_failed(e),
        }
    }
}

impl std::fmt::Debug for EventFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFanout")
            .field("listener_count", &self.listener_count())
            .field("faults", &self.fault_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
