//! Owned, cancellable handle for a session's watchdog task.
//!
//! A [`WatchdogTimer`] owns the spawned task together with the
//! [`CancellationToken`] and epoch it runs under. The task receives a
//! [`TimerTicket`] and must stop as soon as the ticket reports cancellation
//! or its epoch is no longer the session's current one.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The running task's view of its timer.
#[derive(Debug, Clone)]
pub struct TimerTicket {
    epoch: u64,
    cancel: CancellationToken,
}

impl TimerTicket {
    /// Returns the epoch this timer was started under.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns whether the timer has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleeps for `duration`. Returns `false` if cancelled first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Sleeps until `duration` has passed since `start`.
    ///
    /// A deadline past the clock's range waits for `duration` from now.
    pub async fn sleep_past(&self, start: Instant, duration: Duration) -> bool {
        match start.checked_add(duration) {
            Some(deadline) => self.sleep_until(deadline).await,
            None => self.sleep(duration).await,
        }
    }

    /// Sleeps until `deadline`. Returns `false` if cancelled first.
    pub async fn sleep_until(&self, deadline: Instant) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep_until(deadline) => true,
        }
    }

    /// Runs `fut` unless the timer is cancelled first.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

/// Handle to a spawned watchdog task. Dropping it cancels the task.
#[derive(Debug)]
pub struct WatchdogTimer {
    epoch: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchdogTimer {
    /// Spawns `body` on `runtime` with a fresh ticket for `epoch`.
    ///
    /// May be called from any thread.
    pub fn spawn<F, Fut>(runtime: &Handle, epoch: u64, body: F) -> Self
    where
        F: FnOnce(TimerTicket) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let ticket = TimerTicket {
            epoch,
            cancel: cancel.clone(),
        };
        let task = runtime.spawn(body(ticket));
        Self {
            epoch,
            cancel,
            task,
        }
    }

    /// Returns the epoch this timer was started under.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Signals the task to stop at its next step.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for WatchdogTimer {
    fn drop(&mut self) {
        // The task may be the one dropping us (escalation), so it is told to
        // stop rather than aborted.
        self.cancel.cancel();
    }
}
