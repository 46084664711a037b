//! Cooperative cancellation for parse operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

type Callback = Box<dyn FnOnce() + Send>;

/// A one-shot cancellation flag with a single attachable callback.
///
/// The token transitions `pending -> cancelled` exactly once. Cancelling
/// invokes the registered callback synchronously, under the token's lock, so
/// a parse that wired the callback to its native cancellation flag observes
/// the cancellation before `cancel` returns. A callback registered after the
/// token was already cancelled fires immediately.
///
/// Tokens are cheap to clone and share between threads.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    callback: Mutex<Option<Callback>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `cancel` has been called.
    pub fn cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel the token, invoking the registered callback at most once.
    ///
    /// Subsequent calls are no-ops.
    pub fn cancel(&self) {
        let mut slot = self.inner.callback.lock();
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(callback) = slot.take() {
            callback();
        }
    }

    /// Attach the callback invoked on cancellation.
    ///
    /// At most one callback is held; registering again replaces the previous
    /// one. If the token is already cancelled the callback runs immediately
    /// on the calling thread.
    pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) {
        let mut slot = self.inner.callback.lock();
        if self.inner.cancelled.load(Ordering::SeqCst) {
            drop(slot);
            callback();
        } else {
            *slot = Some(Box::new(callback));
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.cancelled())
            .finish()
    }
}
