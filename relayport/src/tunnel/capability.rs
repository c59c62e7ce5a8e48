//! The two things a tunnel needs from the outside world: somewhere to accept
//! local connections and something to open remote streams on.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;

use crate::mux;

#[async_trait]
pub trait Listener: Send + Sync + 'static {
    type Conn: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Wait for the next connection. An error means the listener is unusable.
    async fn accept(&self) -> io::Result<(Self::Conn, SocketAddr)>;

    /// Stop accepting; a pending `accept` returns an error.
    fn close(&self) -> io::Result<()>;
}

#[async_trait]
pub trait Session: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn open_stream(&self) -> io::Result<Self::Stream>;

    /// Close the session, ending every open stream.
    fn close(&self) -> io::Result<()>;

    /// Resolves once the session is closed, by `close` or by the peer.
    async fn closed(&self);
}

/// TCP listener whose `close` unblocks a concurrent `accept`.
#[derive(Debug)]
pub struct TcpAcceptor {
    inner: TcpListener,
    closed: CancellationToken,
}

impl TcpAcceptor {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        Ok(Self {
            inner: TcpListener::bind(addr).await?,
            closed: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

#[async_trait]
impl Listener for TcpAcceptor {
    type Conn = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "listener closed",
            )),
            accepted = self.inner.accept() => accepted,
        }
    }

    fn close(&self) -> io::Result<()> {
        self.closed.cancel();
        Ok(())
    }
}

#[async_trait]
impl Session for mux::Session {
    type Stream = mux::MuxStream;

    async fn open_stream(&self) -> io::Result<mux::MuxStream> {
        Ok(mux::Session::open_stream(self).await?)
    }

    fn close(&self) -> io::Result<()> {
        mux::Session::close(self);
        Ok(())
    }

    async fn closed(&self) {
        mux::Session::closed(self).await
    }
}
