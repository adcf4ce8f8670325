//! One-shot stop signal shared between the control server and health waits.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A trigger-once broadcast signal.
///
/// Starts untriggered; [`StopSignal::trigger`] flips it exactly once and
/// wakes every current and future waiter. Used to race shutdown against
/// in-progress readiness waits: whichever task calls `trigger` first wins,
/// and all later calls observe that they lost.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the signal. Returns `true` for the single caller that
    /// performed the transition, `false` for everyone after.
    pub fn trigger(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Wait until the signal is triggered. Returns immediately if it
    /// already was.
    pub async fn wait(&self) {
        loop {
            if self.is_triggered() {
                return;
            }
            let notified = self.notify.notified();
            // Re-check after registering the waiter: a trigger landing
            // between the check above and registration would otherwise be
            // missed, since notify_waiters only wakes registered waiters.
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}
