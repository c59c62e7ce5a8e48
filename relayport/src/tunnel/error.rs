use std::io;

use thiserror::Error;

use crate::mux::MuxError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum TunnelError {
    /// Operator asked the tunnel to stop; not a failure.
    #[error("interrupted")]
    Interrupted,

    #[error("failed to accept local connection")]
    Accept(#[source] io::Error),

    #[error("failed to open tunnel stream")]
    OpenStream(#[source] io::Error),

    #[error("relay session closed")]
    SessionClosed,

    #[error("invalid remote port {0:?}")]
    InvalidPort(String),

    #[error("failed to listen on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to relay")]
    Transport(#[from] TransportError),

    #[error("failed to start multiplexing session")]
    Mux(#[from] MuxError),
}

impl TunnelError {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, TunnelError::Interrupted)
    }
}
