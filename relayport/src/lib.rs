//! Forward a local TCP port to a remote host through a relay.
//!
//! Bytes from every local connection travel as separate streams of one
//! multiplexed session, which itself runs over a single WebSocket to the relay.

pub mod config;
pub mod mux;
pub mod pool;
pub mod transport;
pub mod tunnel;

pub use config::TunnelConfig;
pub use tunnel::{Tunnel, TunnelError};
