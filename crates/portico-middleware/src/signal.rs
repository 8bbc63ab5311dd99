//! Client disconnect notification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Fired when the client of a request goes away.
///
/// The connection task owns one end and triggers it; the executor observes
/// it and abandons the remaining chain. Clones share state.
///
/// ```rust
/// use portico_middleware::DisconnectSignal;
///
/// let signal = DisconnectSignal::new();
/// let observer = signal.clone();
/// signal.trigger();
/// assert!(observer.is_triggered());
/// ```
#[derive(Debug, Clone)]
pub struct DisconnectSignal {
    triggered: Arc<AtomicBool>,
    sender: broadcast::Sender<()>,
}

impl DisconnectSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            sender,
        }
    }

    /// Marks the client as gone. Idempotent.
    pub fn trigger(&self) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self.sender.send(());
        }
    }

    /// `true` once triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Completes once the signal is triggered.
    pub async fn triggered(&self) {
        let mut receiver = self.sender.subscribe();
        if self.is_triggered() {
            return;
        }
        let _ = receiver.recv().await;
    }
}

impl Default for DisconnectSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Triggers the signal when dropped, unless disarmed.
///
/// Held by the connection task across the request future: if hyper drops
/// the future because the peer closed the connection, the guard fires.
#[derive(Debug)]
pub struct DisconnectGuard {
    signal: DisconnectSignal,
    armed: bool,
}

impl DisconnectGuard {
    /// Arms a guard for `signal`.
    #[must_use]
    pub const fn new(signal: DisconnectSignal) -> Self {
        Self {
            signal,
            armed: true,
        }
    }

    /// The request completed normally.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed {
            self.signal.trigger();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_triggered_wakes_waiter() {
        let signal = DisconnectSignal::new();
        let waiter = signal.clone();
        let task = tokio::spawn(async move { waiter.triggered().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_already_triggered_returns_immediately() {
        let signal = DisconnectSignal::new();
        signal.trigger();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(50), signal.triggered())
            .await
            .unwrap();
    }

    #[test]
    fn test_guard_fires_unless_disarmed() {
        let signal = DisconnectSignal::new();
        drop(DisconnectGuard::new(signal.clone()));
        assert!(signal.is_triggered());

        let signal = DisconnectSignal::new();
        DisconnectGuard::new(signal.clone()).disarm();
        assert!(!signal.is_triggered());
    }
}
