use std::sync::Arc;

use tracing::{debug, warn};

use super::handler::handle_connection;
use super::{Listener, Session, TunnelContext, TunnelError};

/// Accept local connections until the listener fails, one handler task each.
///
/// Any accept error ends the loop and shuts the tunnel down; a closed listener
/// is how an orderly shutdown reaches this loop too.
pub async fn accept_loop<L, S>(ctx: Arc<TunnelContext<L, S>>)
where
    L: Listener,
    S: Session,
{
    loop {
        match ctx.listener().accept().await {
            Ok((conn, peer)) => {
                debug!(%peer, "accepted local connection");
                tokio::spawn(handle_connection(ctx.clone(), conn, peer));
            }
            Err(e) => {
                if ctx.is_shutting_down() {
                    debug!(error = %e, "listener closed");
                } else {
                    warn!(error = %e, "accept failed");
                }
                ctx.shutdown(TunnelError::Accept(e));
                return;
            }
        }
    }
}
