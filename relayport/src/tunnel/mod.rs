//! Local TCP port forwarded over a multiplexed relay session.
//!
//! A [`TunnelContext`] owns the listener and the session. The accept loop
//! hands each local connection to a handler that opens one stream, writes the
//! [`StreamMetadata`] header and relays bytes both ways. Systemic failures and
//! interrupts all go through [`TunnelContext::shutdown`], which closes both
//! shared resources exactly once.

mod accept;
mod capability;
mod context;
mod error;
mod handler;
mod metadata;
mod relay;
mod run;
mod shutdown;

pub use accept::accept_loop;
pub use capability::{Listener, Session, TcpAcceptor};
pub use context::TunnelContext;
pub use error::TunnelError;
pub use handler::handle_connection;
pub use metadata::StreamMetadata;
pub use relay::{copy_pooled, relay, Direction, RelayEnd};
pub use run::{serve, Tunnel};
pub use shutdown::Shutdown;
