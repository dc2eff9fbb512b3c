//! One-shot readiness latches.
//!
//! Every step of the page/host handshake — DOM-ready, page-initialized,
//! backend-ready, overall-ready — is a [`ReadinessSignal`]: a deferred
//! boolean that is written exactly once and read by any number of waiters.

use tokio::sync::watch;

/// A one-shot latch with three states: pending, resolved-true,
/// resolved-false.
///
/// All waiters unblock with the same value once resolved. Resolving an
/// already-resolved signal is a no-op.
#[derive(Debug, Clone)]
pub struct ReadinessSignal {
    tx: watch::Sender<Option<bool>>,
    rx: watch::Receiver<Option<bool>>,
}

impl ReadinessSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self { tx, rx }
    }

    /// Resolve the signal. Returns `true` if this call resolved it,
    /// `false` if it was already resolved (the stored value is unchanged).
    pub fn resolve(&self, value: bool) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_some() {
                false
            } else {
                *state = Some(value);
                true
            }
        })
    }

    /// The current state without waiting.
    pub fn peek(&self) -> Option<bool> {
        *self.rx.borrow()
    }

    pub fn is_resolved(&self) -> bool {
        self.peek().is_some()
    }

    /// Wait until the signal resolves and return its value.
    pub async fn wait(&self) -> bool {
        let mut rx = self.rx.clone();
        loop {
            if let Some(value) = *rx.borrow_and_update() {
                return value;
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}
