//! Per-batch in-flight accounting

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Counts outstanding handler invocations for one polled batch.
///
/// The poller adds the batch size up front, each dispatched record calls
/// [`InFlight::done`] exactly once, and [`InFlight::wait_idle`] is the
/// commit barrier: it resolves only when the count reaches zero.
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    notify: Notify,
}

impl InFlight {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` outstanding invocations.
    pub fn add(&self, n: usize) {
        self.count.fetch_add(n, Ordering::AcqRel);
    }

    /// Marks one invocation complete, waking waiters on the last one.
    pub fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Current outstanding count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Waits until the count reaches zero.
    pub async fn wait_idle(&self) {
        loop {
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            let notified = self.notify.notified();
            // Re-check after registering so a decrement between the load
            // and the registration cannot be missed.
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}
