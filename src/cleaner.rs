//! Deferred release of engine-owned resources.
//!
//! Trees and parser sessions can be dropped from any thread, including ones
//! that must never block on engine teardown. Instead of releasing in `Drop`,
//! disposers are handed to a single background worker that runs them in
//! arrival order. The worker thread starts lazily on first use and lives for
//! the rest of the process.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::OnceLock;
use std::sync::mpsc::{Sender, channel};
use std::thread;

use tracing::{debug, error};

type Disposer = Box<dyn FnOnce() + Send>;

static CLEANER: OnceLock<Sender<Disposer>> = OnceLock::new();

fn sender() -> &'static Sender<Disposer> {
    CLEANER.get_or_init(|| {
        let (tx, rx) = channel::<Disposer>();
        thread::Builder::new()
            .name("treezip-cleaner".into())
            .spawn(move || {
                debug!("cleaner worker started");
                while let Ok(disposer) = rx.recv() {
                    // A panicking disposer must not take the worker down with
                    // it; later disposals still have to run.
                    if catch_unwind(AssertUnwindSafe(disposer)).is_err() {
                        error!("resource disposer panicked");
                    }
                }
            })
            .unwrap_or_else(|e| panic!("failed to spawn cleaner thread: {e}"));
        tx
    })
}

/// Queue a disposer for the background worker.
///
/// Falls back to running it inline if the worker has already shut down
/// (process teardown).
pub(crate) fn schedule(disposer: Disposer) {
    if let Err(returned) = sender().send(disposer) {
        (returned.0)();
    }
}

/// Owns one disposer and guarantees it runs exactly once.
///
/// Dropping the guard queues the disposer on the cleaner thread;
/// [`ReleaseGuard::release_now`] runs it eagerly on the calling thread
/// instead.
pub(crate) struct ReleaseGuard {
    disposer: Option<Disposer>,
}

impl ReleaseGuard {
    pub(crate) fn new(disposer: impl FnOnce() + Send + 'static) -> Self {
        ReleaseGuard {
            disposer: Some(Box::new(disposer)),
        }
    }

    /// Run the disposer immediately instead of deferring it.
    pub(crate) fn release_now(mut self) {
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(disposer) = self.disposer.take() {
            schedule(disposer);
        }
    }
}
