use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{Cmd, Frame, Header, MuxConfig, MuxError, MuxStream, HEADER_SIZE};

/// Outgoing frames buffered between streams and the writer task.
const FRAME_QUEUE: usize = 1024;

pub(super) enum StreamEvent {
    Data(Bytes),
    Fin,
}

/// State shared by the session handle, its streams and its background tasks.
pub(super) struct Shared {
    pub(super) config: MuxConfig,
    pub(super) frames: mpsc::Sender<Frame>,
    streams: Mutex<HashMap<u32, mpsc::UnboundedSender<StreamEvent>>>,
    /// `None` once the id space is used up.
    next_sid: Mutex<Option<u32>>,
    /// Receive budget; goes negative while streams sit on unread data.
    bucket: AtomicI64,
    tokens_returned: Notify,
    /// Set by every received frame, cleared by each keep-alive check.
    data_ready: AtomicBool,
    closed: CancellationToken,
}

impl Shared {
    fn streams(&self) -> MutexGuard<'_, HashMap<u32, mpsc::UnboundedSender<StreamEvent>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(super) fn remove_stream(&self, sid: u32) {
        self.streams().remove(&sid);
    }

    pub(super) fn return_tokens(&self, n: usize) {
        if n == 0 {
            return;
        }
        self.bucket.fetch_add(n as i64, Ordering::AcqRel);
        self.tokens_returned.notify_waiters();
    }

    fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        // Dropping the senders ends every stream's read side with a broken pipe.
        self.streams().clear();
        self.tokens_returned.notify_waiters();
    }

    fn allocate_sid(&self) -> Result<u32, MuxError> {
        let mut next = self.next_sid.lock().unwrap_or_else(PoisonError::into_inner);
        let sid = next.ok_or(MuxError::GoAway)?;
        *next = sid.checked_add(2);
        Ok(sid)
    }

    async fn send_frame(&self, frame: Frame) -> Result<(), MuxError> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(MuxError::SessionClosed),
            sent = self.frames.send(frame) => sent.map_err(|_| MuxError::SessionClosed),
        }
    }

    fn deliver(&self, sid: u32, data: Bytes) {
        if data.is_empty() {
            return;
        }
        let streams = self.streams();
        let Some(tx) = streams.get(&sid) else {
            trace!(sid, len = data.len(), "data for unknown stream dropped");
            return;
        };
        let len = data.len();
        self.bucket.fetch_sub(len as i64, Ordering::AcqRel);
        if tx.send(StreamEvent::Data(data)).is_err() {
            self.return_tokens(len);
        }
    }

    fn finish(&self, sid: u32) {
        if let Some(tx) = self.streams().remove(&sid) {
            let _ = tx.send(StreamEvent::Fin);
        }
    }

    async fn wait_for_tokens(&self) {
        loop {
            let notified = self.tokens_returned.notified();
            if self.bucket.load(Ordering::Acquire) > 0 || self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

/// Client side of a multiplexed session.
///
/// Background tasks read frames from the transport, write queued frames to it
/// and run the keep-alive. They stop when the session is closed, either by
/// [`Session::close`] or because the transport failed.
pub struct Session {
    shared: Arc<Shared>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("streams", &self.stream_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Start a client session over `conn`. Must be called inside a tokio runtime.
    pub fn client<T>(conn: T, config: MuxConfig) -> Result<Self, MuxError>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        config.verify()?;

        let (reader, writer) = tokio::io::split(conn);
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE);
        let bucket = config.max_receive_buffer as i64;
        let shared = Arc::new(Shared {
            config,
            frames: frames_tx,
            streams: Mutex::new(HashMap::new()),
            next_sid: Mutex::new(Some(1)),
            bucket: AtomicI64::new(bucket),
            tokens_returned: Notify::new(),
            data_ready: AtomicBool::new(false),
            closed: CancellationToken::new(),
        });

        tokio::spawn(recv_loop(reader, shared.clone()));
        tokio::spawn(send_loop(writer, frames_rx, shared.clone()));
        if !shared.config.keep_alive_disabled {
            tokio::spawn(keep_alive(shared.clone()));
        }

        Ok(Self { shared })
    }

    /// Open a new stream. Client stream ids are odd.
    pub async fn open_stream(&self) -> Result<MuxStream, MuxError> {
        if self.shared.is_closed() {
            return Err(MuxError::SessionClosed);
        }

        let sid = self.shared.allocate_sid()?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.streams().insert(sid, tx);

        if let Err(e) = self.shared.send_frame(Frame::new(Cmd::Syn, sid)).await {
            self.shared.remove_stream(sid);
            return Err(e);
        }

        debug!(sid, "stream opened");
        Ok(MuxStream::new(sid, self.shared.clone(), rx))
    }

    /// Close the session and its transport. Calling it again does nothing.
    pub fn close(&self) {
        if !self.shared.is_closed() {
            debug!(streams = self.stream_count(), "closing session");
        }
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Resolves once the session is closed, for whatever reason.
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await
    }

    pub fn stream_count(&self) -> usize {
        self.shared.streams().len()
    }
}

async fn recv_loop<R>(mut reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let result = tokio::select! {
        biased;
        _ = shared.closed.cancelled() => Ok(()),
        result = read_frames(&mut reader, &shared) => result,
    };

    match result {
        Ok(()) => debug!("session reader stopped"),
        Err(e) => warn!(error = %e, "session reader failed"),
    }
    shared.close();
}

async fn read_frames<R>(reader: &mut R, shared: &Shared) -> Result<(), MuxError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_SIZE];
    loop {
        shared.wait_for_tokens().await;

        match reader.read_exact(&mut raw).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        shared.data_ready.store(true, Ordering::Release);

        let header = Header::decode(&raw)?;
        let data = if header.length > 0 {
            let mut buf = BytesMut::zeroed(header.length as usize);
            reader.read_exact(&mut buf).await?;
            buf.freeze()
        } else {
            Bytes::new()
        };
        trace!(cmd = ?header.cmd, sid = header.sid, len = header.length, "frame received");

        match header.cmd {
            Cmd::Nop => {}
            Cmd::Syn => warn!(sid = header.sid, "ignoring stream opened by peer"),
            Cmd::Fin => shared.finish(header.sid),
            Cmd::Psh => shared.deliver(header.sid, data),
        }
    }
}

async fn send_loop<W>(mut writer: W, mut frames: mpsc::Receiver<Frame>, shared: Arc<Shared>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = shared.closed.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let written = tokio::select! {
            biased;
            _ = shared.closed.cancelled() => break,
            written = write_frame(&mut writer, &frame) => written,
        };
        if let Err(e) = written {
            warn!(error = %e, "session writer failed");
            shared.close();
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "transport close failed");
    }
}

async fn write_frame<W>(writer: &mut W, frame: &Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await
}

async fn keep_alive(shared: Arc<Shared>) {
    let interval = shared.config.keep_alive_interval;
    let timeout = shared.config.keep_alive_timeout;
    let mut ping = interval_at(Instant::now() + interval, interval);
    let mut check = interval_at(Instant::now() + timeout, timeout);

    loop {
        tokio::select! {
            biased;
            _ = shared.closed.cancelled() => break,
            _ = ping.tick() => {
                if shared.frames.try_send(Frame::new(Cmd::Nop, 0)).is_err() {
                    trace!("keep-alive skipped, frame queue full");
                }
            }
            _ = check.tick() => {
                let heard = shared.data_ready.swap(false, Ordering::AcqRel);
                // A throttled reader is not evidence of a dead peer.
                if !heard && shared.bucket.load(Ordering::Acquire) > 0 {
                    warn!(?timeout, "keep-alive timeout, closing session");
                    shared.close();
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};

    fn quiet() -> MuxConfig {
        MuxConfig {
            keep_alive_disabled: true,
            ..Default::default()
        }
    }

    async fn read_frame(peer: &mut DuplexStream) -> (Header, Bytes) {
        let mut raw = [0u8; HEADER_SIZE];
        peer.read_exact(&mut raw).await.unwrap();
        let header = Header::decode(&raw).unwrap();
        let mut data = vec![0u8; header.length as usize];
        peer.read_exact(&mut data).await.unwrap();
        (header, data.into())
    }

    async fn write_frame(peer: &mut DuplexStream, frame: Frame) {
        peer.write_all(&frame.encode()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_exchange_with_peer() {
        let (client, mut peer) = duplex(64 * 1024);
        let session = Session::client(client, quiet()).unwrap();

        let mut stream = session.open_stream().await.unwrap();
        assert_eq!(stream.id(), 1);
        let (header, _) = read_frame(&mut peer).await;
        assert_eq!(header.cmd, Cmd::Syn);
        assert_eq!(header.sid, 1);

        stream.write_all(b"ping").await.unwrap();
        let (header, data) = read_frame(&mut peer).await;
        assert_eq!(header.cmd, Cmd::Psh);
        assert_eq!(&data[..], b"ping");

        write_frame(&mut peer, Frame::data(1, Bytes::from_static(b"pong"))).await;
        write_frame(&mut peer, Frame::new(Cmd::Fin, 1)).await;

        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"pong");

        stream.shutdown().await.unwrap();
        let (header, _) = read_frame(&mut peer).await;
        assert_eq!(header.cmd, Cmd::Fin);
        assert_eq!(header.sid, 1);
    }

    #[tokio::test]
    async fn test_stream_ids_are_odd_and_increasing() {
        let (client, _peer) = duplex(64 * 1024);
        let session = Session::client(client, quiet()).unwrap();

        let first = session.open_stream().await.unwrap();
        let second = session.open_stream().await.unwrap();
        assert_eq!((first.id(), second.id()), (1, 3));
        assert_eq!(session.stream_count(), 2);

        drop(first);
        assert_eq!(session.stream_count(), 1);
    }

    #[tokio::test]
    async fn test_large_write_is_split_into_frames() {
        let (client, mut peer) = duplex(64 * 1024);
        let config = MuxConfig {
            max_frame_size: 4,
            ..quiet()
        };
        let session = Session::client(client, config).unwrap();
        let mut stream = session.open_stream().await.unwrap();
        read_frame(&mut peer).await;

        stream.write_all(b"abcdefghij").await.unwrap();

        let mut sizes = Vec::new();
        let mut payload = Vec::new();
        while payload.len() < 10 {
            let (header, data) = read_frame(&mut peer).await;
            assert_eq!(header.cmd, Cmd::Psh);
            sizes.push(data.len());
            payload.extend_from_slice(&data);
        }
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(payload, b"abcdefghij");
    }

    #[tokio::test]
    async fn test_close_fails_opens_and_breaks_streams() {
        let (client, mut peer) = duplex(64 * 1024);
        let session = Session::client(client, quiet()).unwrap();
        let mut stream = session.open_stream().await.unwrap();
        read_frame(&mut peer).await;

        session.close();
        session.close();
        assert!(session.is_closed());

        assert!(matches!(
            session.open_stream().await,
            Err(MuxError::SessionClosed)
        ));

        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        let err = stream.write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        // The writer task shuts the transport down.
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), peer.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_transport_eof_closes_session() {
        let (client, peer) = duplex(64 * 1024);
        let session = Session::client(client, quiet()).unwrap();
        drop(peer);

        tokio::time::timeout(Duration::from_secs(5), session.closed())
            .await
            .unwrap();
        assert!(session.open_stream().await.is_err());
    }

    #[tokio::test]
    async fn test_bad_version_closes_session() {
        let (client, mut peer) = duplex(64 * 1024);
        let session = Session::client(client, quiet()).unwrap();
        peer.write_all(&[9, 3, 0, 0, 0, 0, 0, 0]).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), session.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stream_id_exhaustion() {
        let (client, _peer) = duplex(64 * 1024);
        let session = Session::client(client, quiet()).unwrap();
        *session.shared.next_sid.lock().unwrap() = Some(u32::MAX);

        let last = session.open_stream().await.unwrap();
        assert_eq!(last.id(), u32::MAX);
        assert!(matches!(session.open_stream().await, Err(MuxError::GoAway)));
    }

    #[tokio::test]
    async fn test_receive_budget_resumes_after_reads() {
        let (client, mut peer) = duplex(64 * 1024);
        let config = MuxConfig {
            max_receive_buffer: 8,
            max_stream_buffer: 8,
            ..quiet()
        };
        let session = Session::client(client, config).unwrap();
        let mut stream = session.open_stream().await.unwrap();
        read_frame(&mut peer).await;

        write_frame(&mut peer, Frame::data(1, Bytes::from_static(b"01234567"))).await;
        write_frame(&mut peer, Frame::data(1, Bytes::from_static(b"89abcdef"))).await;

        let mut buf = [0u8; 16];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"0123456789abcdef");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_sends_nop() {
        let (client, mut peer) = duplex(64 * 1024);
        let _session = Session::client(client, MuxConfig::default()).unwrap();

        let (header, data) = tokio::time::timeout(Duration::from_secs(11), read_frame(&mut peer))
            .await
            .unwrap();
        assert_eq!(header.cmd, Cmd::Nop);
        assert_eq!(header.sid, 0);
        assert!(data.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_hits_keep_alive_timeout() {
        let (client, _peer) = duplex(64 * 1024);
        let session = Session::client(client, MuxConfig::default()).unwrap();

        tokio::time::timeout(Duration::from_secs(31), session.closed())
            .await
            .unwrap();
    }
}
