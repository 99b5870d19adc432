//! Cooperative cancellation for match calls.
//!
//! A `Canceller` flips a shared flag and disconnects a wake channel, so a
//! thread sleeping in `CancelToken::sleep` is woken immediately instead of
//! finishing its delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

#[derive(Debug)]
struct Shared {
    cancelled: AtomicBool,
    wake_tx: Mutex<Option<Sender<()>>>,
    wake_rx: Receiver<()>,
}

/// Observes cancellation. Cheap to clone; all clones share one signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    shared: Option<Arc<Shared>>,
}

/// Triggers cancellation of every token created alongside it.
#[derive(Debug, Clone)]
pub struct Canceller {
    shared: Arc<Shared>,
}

impl CancelToken {
    /// Creates a linked canceller/token pair.
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Canceller, CancelToken) {
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let shared = Arc::new(Shared {
            cancelled: AtomicBool::new(false),
            wake_tx: Mutex::new(Some(wake_tx)),
            wake_rx,
        });
        (
            Canceller {
                shared: Arc::clone(&shared),
            },
            CancelToken { shared: Some(shared) },
        )
    }

    /// A token that is never cancelled.
    #[must_use]
    pub const fn never() -> Self {
        Self { shared: None }
    }

    /// True once the linked canceller has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|s| s.cancelled.load(Ordering::Acquire))
    }

    /// Sleeps for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if cancelled.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> bool {
        let Some(shared) = &self.shared else {
            thread::sleep(duration);
            return true;
        };
        if self.is_cancelled() {
            return false;
        }

        let Some(deadline) = Instant::now().checked_add(duration) else {
            // No representable deadline: wait for cancellation alone.
            let _ = shared.wake_rx.recv();
            return !self.is_cancelled();
        };
        match shared.wake_rx.recv_deadline(deadline) {
            Err(RecvTimeoutError::Timeout) => !self.is_cancelled(),
            // Nothing is ever sent; a wakeup means the sender was dropped by `cancel`.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.is_cancelled() {
                    return false;
                }
                thread::sleep(deadline.saturating_duration_since(Instant::now()));
                !self.is_cancelled()
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

impl Canceller {
    /// Cancels all linked tokens. Idempotent.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
        let mut wake_tx = self
            .shared
            .wake_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        wake_tx.take();
    }

    /// True once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }
}
