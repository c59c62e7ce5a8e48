//! Header written at the start of every tunnel stream.
//!
//! The relay reads one JSON line telling it which remote port to dial; every
//! byte after the newline is relayed untouched.

use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::TunnelError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Kept as a string on the wire.
    pub remote_port: String,
}

impl StreamMetadata {
    /// Validate `port` and build the header for it.
    pub fn for_port(port: &str) -> Result<Self, TunnelError> {
        match port.trim().parse::<u16>() {
            Ok(p) if p != 0 => Ok(Self {
                remote_port: p.to_string(),
            }),
            _ => Err(TunnelError::InvalidPort(port.to_string())),
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    pub fn decode(line: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(line.trim_ascii_end())
    }

    /// Write the header as a single write, so it travels in one frame.
    pub async fn write_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let line = self.encode().map_err(io::Error::other)?;
        writer.write_all(&line).await?;
        writer.flush().await
    }

    /// Read the header line, leaving the relayed bytes in `reader`.
    pub async fn read_from<R>(reader: &mut R) -> io::Result<Self>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Self::decode(&line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
