use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::relay::relay;
use super::{Listener, Session, TunnelContext, TunnelError};

/// Carry one local connection over a fresh tunnel stream.
///
/// Failing to open the stream means the session is unhealthy, so that shuts
/// the whole tunnel down. Everything after that only affects this connection.
pub async fn handle_connection<L, S>(ctx: Arc<TunnelContext<L, S>>, mut conn: L::Conn, peer: SocketAddr)
where
    L: Listener,
    S: Session,
{
    if ctx.is_shutting_down() {
        debug!(%peer, "tunnel shutting down, dropping connection");
        return;
    }

    let mut stream = match ctx.session().open_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(%peer, error = %e, "failed to open tunnel stream");
            ctx.shutdown(TunnelError::OpenStream(e));
            let _ = conn.shutdown().await;
            return;
        }
    };

    if let Err(e) = ctx.metadata().write_to(&mut stream).await {
        debug!(%peer, error = %e, "failed to write stream header");
        let _ = conn.shutdown().await;
        let _ = stream.shutdown().await;
        return;
    }

    let end = relay(&mut conn, &mut stream, ctx.pool()).await;
    match &end.result {
        Ok(bytes) => debug!(%peer, direction = %end.direction, bytes, "connection finished"),
        Err(e) => debug!(%peer, direction = %end.direction, error = %e, "connection failed"),
    }

    let _ = conn.shutdown().await;
    let _ = stream.shutdown().await;
}
