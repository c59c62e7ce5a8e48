use tokio_util::sync::WaitForCancellationFuture;
use tracing::{info, warn};

use super::shutdown::Shutdown;
use super::{Listener, Session, StreamMetadata, TunnelError};
use crate::pool::BufferPool;

/// Everything one tunnel run shares between its workers.
///
/// The listener and session are only ever closed through [`TunnelContext::shutdown`].
#[derive(Debug)]
pub struct TunnelContext<L, S> {
    listener: L,
    session: S,
    metadata: StreamMetadata,
    pool: BufferPool,
    shutdown: Shutdown,
}

impl<L, S> TunnelContext<L, S>
where
    L: Listener,
    S: Session,
{
    pub fn new(listener: L, session: S, metadata: StreamMetadata) -> Self {
        Self {
            listener,
            session,
            metadata,
            pool: BufferPool::default(),
            shutdown: Shutdown::new(),
        }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Tear the tunnel down because of `cause`.
    ///
    /// Safe to call from any worker at any time. Only the first call closes
    /// the listener and the session and records its cause; it returns `true`.
    pub fn shutdown(&self, cause: TunnelError) -> bool {
        let describe = cause.to_string();
        let performed = self.shutdown.trigger(cause, || {
            if let Err(e) = self.listener.close() {
                warn!(error = %e, "failed to close listener");
            }
            if let Err(e) = self.session.close() {
                warn!(error = %e, "failed to close session");
            }
        });
        if performed {
            info!(cause = %describe, "tunnel shut down");
        }
        performed
    }

    /// Whether a shutdown has started. New streams should not be opened after this.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub fn is_done(&self) -> bool {
        self.shutdown.is_done()
    }

    /// Resolves once shutdown has completed.
    pub fn done(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.done()
    }

    /// The cause of the shutdown, handed out once.
    pub fn take_cause(&self) -> Option<TunnelError> {
        self.shutdown.take_cause()
    }
}
