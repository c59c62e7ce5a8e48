use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::pool::BufferPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local connection to tunnel stream.
    Outbound,
    /// Tunnel stream to local connection.
    Inbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => f.write_str("local -> tunnel"),
            Direction::Inbound => f.write_str("tunnel -> local"),
        }
    }
}

/// How a relay ended: the direction that finished first and its result.
#[derive(Debug)]
pub struct RelayEnd {
    pub direction: Direction,
    pub result: io::Result<u64>,
}

/// Copy until EOF using a buffer borrowed from `pool`.
pub async fn copy_pooled<R, W>(reader: &mut R, writer: &mut W, pool: &BufferPool) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = pool.checkout();
    let mut copied = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(copied);
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        copied += n as u64;
    }
}

/// Relay both directions between `local` and `remote` until either one ends.
///
/// The other direction is dropped mid-flight; the caller closes both ends.
pub async fn relay<A, B>(local: &mut A, remote: &mut B, pool: &BufferPool) -> RelayEnd
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut local_rd, mut local_wr) = tokio::io::split(local);
    let (mut remote_rd, mut remote_wr) = tokio::io::split(remote);

    tokio::select! {
        result = copy_pooled(&mut local_rd, &mut remote_wr, pool) => RelayEnd {
            direction: Direction::Outbound,
            result,
        },
        result = copy_pooled(&mut remote_rd, &mut local_wr, pool) => RelayEnd {
            direction: Direction::Inbound,
            result,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_copy_pooled_returns_buffer() {
        let pool = BufferPool::new(4);
        let mut reader = &b"hello world"[..];
        let mut out = Vec::new();

        let copied = copy_pooled(&mut reader, &mut out, &pool).await.unwrap();
        assert_eq!(copied, 11);
        assert_eq!(out, b"hello world");
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_relay_ends_when_local_closes() {
        let pool = BufferPool::default();
        let (mut local, mut client) = duplex(1024);
        let (mut remote, mut relay_peer) = duplex(1024);

        let relaying = tokio::spawn(async move {
            let end = relay(&mut local, &mut remote, &pool).await;
            (end, pool.idle_count())
        });

        client.write_all(b"request").await.unwrap();
        let mut buf = [0u8; 7];
        relay_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"request");

        relay_peer.write_all(b"reply").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"reply");

        drop(client);
        let (end, idle) = relaying.await.unwrap();
        assert_eq!(end.direction, Direction::Outbound);
        assert_eq!(end.result.unwrap(), 7);
        // Both pooled buffers came back, including the cancelled direction's.
        assert_eq!(idle, 2);
    }

    #[tokio::test]
    async fn test_relay_ends_when_remote_closes() {
        let pool = BufferPool::default();
        let (mut local, _client) = duplex(1024);
        let (mut remote, relay_peer) = duplex(1024);
        drop(relay_peer);

        let end = relay(&mut local, &mut remote, &pool).await;
        assert_eq!(end.direction, Direction::Inbound);
        assert_eq!(end.result.unwrap(), 0);
    }
}
