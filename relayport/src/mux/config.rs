use std::time::Duration;

use super::MuxError;

/// Session parameters. The defaults match what the relay is tuned for and are
/// not exposed to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxConfig {
    pub keep_alive_disabled: bool,
    /// How often a NOP is sent to the peer.
    pub keep_alive_interval: Duration,
    /// Close the session when nothing arrived for this long.
    pub keep_alive_timeout: Duration,
    /// Largest payload carried by a single frame.
    pub max_frame_size: usize,
    /// Bytes received but not yet read by any stream before the session stops
    /// reading from the transport.
    pub max_receive_buffer: usize,
    /// Per-stream window. Protocol v1 has no window updates, so this is only
    /// validated against `max_receive_buffer`.
    pub max_stream_buffer: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            keep_alive_disabled: false,
            keep_alive_interval: Duration::from_secs(10),
            keep_alive_timeout: Duration::from_secs(30),
            max_frame_size: 32 * 1024,
            max_receive_buffer: 4 * 1024 * 1024,
            max_stream_buffer: 64 * 1024,
        }
    }
}

impl MuxConfig {
    pub fn verify(&self) -> Result<(), MuxError> {
        if !self.keep_alive_disabled {
            if self.keep_alive_interval.is_zero() {
                return Err(MuxError::InvalidConfig("keep-alive interval must be positive"));
            }
            if self.keep_alive_timeout < self.keep_alive_interval {
                return Err(MuxError::InvalidConfig(
                    "keep-alive timeout must not be shorter than the interval",
                ));
            }
        }
        if self.max_frame_size == 0 {
            return Err(MuxError::InvalidConfig("max frame size must be positive"));
        }
        if self.max_frame_size > u16::MAX as usize {
            return Err(MuxError::InvalidConfig("max frame size must fit in 65535 bytes"));
        }
        if self.max_receive_buffer == 0 {
            return Err(MuxError::InvalidConfig("max receive buffer must be positive"));
        }
        if self.max_stream_buffer == 0 {
            return Err(MuxError::InvalidConfig("max stream buffer must be positive"));
        }
        if self.max_stream_buffer > self.max_receive_buffer {
            return Err(MuxError::InvalidConfig(
                "max stream buffer must not exceed the receive buffer",
            ));
        }
        Ok(())
    }
}
