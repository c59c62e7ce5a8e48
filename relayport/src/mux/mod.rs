//! Stream multiplexing over a single byte-stream transport.
//!
//! Wire compatible with smux protocol version 1, the framing the relay
//! expects. Only the client role is implemented: streams are opened locally
//! and a remote SYN is ignored.
//!
//! The rest of the tunnel only sees this module through the
//! [`Session`](crate::tunnel::Session) capability. The client role of v1 is a
//! small, fixed protocol, so it lives here on the tokio stack the crate already
//! uses instead of pulling in a separate multiplexing runtime.

mod config;
mod frame;
mod session;
mod stream;

use std::io;

use thiserror::Error;

pub use config::MuxConfig;
pub use frame::{Cmd, Frame, Header, HEADER_SIZE, VERSION};
pub use session::Session;
pub use stream::MuxStream;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("invalid mux config: {0}")]
    InvalidConfig(&'static str),

    #[error("unsupported protocol version {0}")]
    InvalidVersion(u8),

    #[error("unknown frame command {0}")]
    InvalidCommand(u8),

    #[error("session is closed")]
    SessionClosed,

    #[error("stream id space exhausted")]
    GoAway,

    #[error("transport error")]
    Io(#[from] io::Error),
}

impl From<MuxError> for io::Error {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::Io(e) => e,
            closed @ MuxError::SessionClosed => io::Error::new(io::ErrorKind::BrokenPipe, closed),
            other => io::Error::other(other),
        }
    }
}
