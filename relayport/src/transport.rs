//! WebSocket transport exposed as a plain byte stream.
//!
//! The relay speaks discrete binary messages. [`WsByteStream`] turns that into
//! `AsyncRead`/`AsyncWrite`: every write becomes exactly one binary message, and
//! reads drain one message at a time, keeping whatever did not fit in the
//! caller's buffer for the next read.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use http::{HeaderName, HeaderValue};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid transport URL")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported transport scheme {0:?}, expected ws or wss")]
    UnsupportedScheme(String),

    #[error("invalid handshake header {0:?}")]
    InvalidHeader(String),

    #[error("WebSocket handshake failed")]
    Handshake(#[from] WsError),
}

/// Transport produced by [`dial`].
pub type WsTransport = WsByteStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connect to the relay at `url`, sending `headers` on the upgrade request.
///
/// The headers are expected to carry whatever credentials the relay needs.
pub async fn dial(url: &str, headers: &[(String, String)]) -> Result<WsTransport, TransportError> {
    let url = Url::parse(url)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(TransportError::UnsupportedScheme(other.to_string())),
    }

    let mut request = url.as_str().into_client_request()?;
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| TransportError::InvalidHeader(name.clone()))?;
        request.headers_mut().append(header_name, header_value);
    }

    debug!(host = url.host_str().unwrap_or_default(), "dialing transport");
    let (ws_stream, response) = connect_async(request).await?;
    debug!(status = %response.status(), "transport connected");

    Ok(WsByteStream::new(ws_stream))
}

/// Byte-stream view over a message-oriented WebSocket.
#[derive(Debug)]
pub struct WsByteStream<S> {
    inner: S,
    /// Unread tail of the last received message.
    leftover: Bytes,
    eof: bool,
    closed: bool,
}

impl<S> WsByteStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            leftover: Bytes::new(),
            eof: false,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn buffered(&self) -> usize {
        self.leftover.len()
    }
}

fn is_closed_error(err: &WsError) -> bool {
    matches!(err, WsError::ConnectionClosed | WsError::AlreadyClosed)
}

impl<S> AsyncRead for WsByteStream<S>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.leftover.is_empty() {
                let n = this.leftover.len().min(buf.remaining());
                buf.put_slice(&this.leftover.split_to(n));
                return Poll::Ready(Ok(()));
            }
            if this.eof {
                return Poll::Ready(Ok(()));
            }

            match ready!(this.inner.poll_next_unpin(cx)) {
                Some(Ok(WsMessage::Binary(data))) => {
                    trace!(len = data.len(), "transport frame received");
                    this.leftover = data;
                }
                Some(Ok(WsMessage::Text(text))) => {
                    this.leftover = Bytes::copy_from_slice(text.as_bytes());
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "transport closed by remote");
                    this.eof = true;
                }
                // Control frames; tungstenite answers pings on its own.
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Err(e)) if is_closed_error(&e) => this.eof = true,
                Some(Err(e)) => return Poll::Ready(Err(io::Error::other(e))),
                None => this.eof = true,
            }
        }
    }
}

impl<S> AsyncWrite for WsByteStream<S>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }

        ready!(this.inner.poll_ready_unpin(cx)).map_err(io::Error::other)?;
        this.inner
            .start_send_unpin(WsMessage::Binary(Bytes::copy_from_slice(buf)))
            .map_err(io::Error::other)?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Ok(()));
        }
        this.inner.poll_flush_unpin(cx).map_err(io::Error::other)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Ok(()));
        }

        let result = ready!(this.inner.poll_close_unpin(cx));
        this.closed = true;
        match result {
            Ok(()) => Poll::Ready(Ok(())),
            Err(e) if is_closed_error(&e) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(io::Error::other(e))),
        }
    }
}
