//! One-shot broadcast cancellation signal.
//!
//! Each engine run carries two of these: a soft-cancel (pause) and a
//! hard-cancel (stop). Every in-flight fetch selects on both; once fired a
//! signal stays fired for the rest of the run.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct Signal {
    fired: AtomicBool,
    notify: Notify,
}

impl Signal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal and wake every waiter. Idempotent.
    pub fn fire(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolve once the signal has fired. Immediate if it already has.
    pub async fn fired(&self) {
        // The permit must be registered before the flag check, otherwise a
        // fire() between check and await is lost.
        while !self.is_fired() {
            let notified = self.notify.notified();
            if self.is_fired() {
                break;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn waiters_wake_on_fire() {
        let signal = Arc::new(Signal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.fired().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        signal.fire();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter wakes")
            .expect("waiter task");
    }

    #[tokio::test]
    async fn already_fired_resolves_immediately() {
        let signal = Signal::new();
        signal.fire();
        assert!(signal.is_fired());
        tokio::time::timeout(Duration::from_millis(100), signal.fired())
            .await
            .expect("resolves at once");
    }
}
