//! One-way Running -> ShutDown transition shared by every tunnel worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

use super::TunnelError;

#[derive(Debug, Default)]
pub struct Shutdown {
    triggered: AtomicBool,
    done: CancellationToken,
    cause: Mutex<Option<TunnelError>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to ShutDown, recording `cause` and running `teardown`.
    ///
    /// Only the first caller wins; it gets `true`. Everyone else gets `false`
    /// immediately and their cause is dropped. `done` fires once `teardown`
    /// returns or unwinds, and the cause is stored before that.
    pub fn trigger<F>(&self, cause: TunnelError, teardown: F) -> bool
    where
        F: FnOnce(),
    {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(cause = %cause, "shutdown already started");
            return false;
        }

        *self.cause.lock().unwrap_or_else(PoisonError::into_inner) = Some(cause);
        let _done = self.done.clone().drop_guard();
        teardown();
        true
    }

    /// True as soon as a shutdown has started, possibly before `done` fires.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }

    pub fn done(&self) -> WaitForCancellationFuture<'_> {
        self.done.cancelled()
    }

    /// The cause recorded by the winning trigger. Returns it once.
    pub fn take_cause(&self) -> Option<TunnelError> {
        self.cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
