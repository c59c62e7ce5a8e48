use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

use super::session::{Shared, StreamEvent};
use super::{Cmd, Frame, MuxError};

/// One logical stream of a [`Session`](super::Session).
///
/// Reads return EOF after the peer's FIN and fail with `BrokenPipe` once the
/// session is gone. Dropping the stream sends FIN if `shutdown` was not called.
pub struct MuxStream {
    sid: u32,
    shared: Arc<Shared>,
    incoming: mpsc::UnboundedReceiver<StreamEvent>,
    leftover: Bytes,
    read_eof: bool,
    outgoing: PollSender<Frame>,
    fin_sent: bool,
}

impl fmt::Debug for MuxStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxStream")
            .field("sid", &self.sid)
            .field("read_eof", &self.read_eof)
            .field("fin_sent", &self.fin_sent)
            .finish()
    }
}

fn broken_pipe() -> io::Error {
    MuxError::SessionClosed.into()
}

impl MuxStream {
    pub(super) fn new(
        sid: u32,
        shared: Arc<Shared>,
        incoming: mpsc::UnboundedReceiver<StreamEvent>,
    ) -> Self {
        let outgoing = PollSender::new(shared.frames.clone());
        Self {
            sid,
            shared,
            incoming,
            leftover: Bytes::new(),
            read_eof: false,
            outgoing,
            fin_sent: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.sid
    }
}

impl AsyncRead for MuxStream {
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
                this.shared.return_tokens(n);
                return Poll::Ready(Ok(()));
            }
            if this.read_eof {
                return Poll::Ready(Ok(()));
            }

            match ready!(this.incoming.poll_recv(cx)) {
                Some(StreamEvent::Data(data)) => this.leftover = data,
                Some(StreamEvent::Fin) => this.read_eof = true,
                None => return Poll::Ready(Err(broken_pipe())),
            }
        }
    }
}

impl AsyncWrite for MuxStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.fin_sent || this.shared.is_closed() {
            return Poll::Ready(Err(broken_pipe()));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        ready!(this.outgoing.poll_reserve(cx)).map_err(|_| broken_pipe())?;
        let n = buf.len().min(this.shared.config.max_frame_size);
        this.outgoing
            .send_item(Frame::data(this.sid, Bytes::copy_from_slice(&buf[..n])))
            .map_err(|_| broken_pipe())?;
        Poll::Ready(Ok(n))
    }

    // Frames are handed to the writer task as soon as they are accepted.
    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.fin_sent {
            return Poll::Ready(Ok(()));
        }
        if this.shared.is_closed() {
            this.fin_sent = true;
            return Poll::Ready(Ok(()));
        }

        let reserved = ready!(this.outgoing.poll_reserve(cx));
        this.fin_sent = true;
        reserved.map_err(|_| broken_pipe())?;
        this.outgoing
            .send_item(Frame::new(Cmd::Fin, this.sid))
            .map_err(|_| broken_pipe())?;
        Poll::Ready(Ok(()))
    }
}

impl Drop for MuxStream {
    fn drop(&mut self) {
        self.shared.remove_stream(self.sid);

        // Unread data still counts against the session's receive budget.
        let mut unread = self.leftover.len();
        self.incoming.close();
        while let Ok(event) = self.incoming.try_recv() {
            if let StreamEvent::Data(data) = event {
                unread += data.len();
            }
        }
        self.shared.return_tokens(unread);

        if !self.fin_sent && !self.shared.is_closed() {
            let _ = self.shared.frames.try_send(Frame::new(Cmd::Fin, self.sid));
        }
    }
}
