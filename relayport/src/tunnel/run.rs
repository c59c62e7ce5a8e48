use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use super::accept::accept_loop;
use super::{Listener, Session, StreamMetadata, TcpAcceptor, TunnelContext, TunnelError};
use crate::config::TunnelConfig;
use crate::{mux, transport};

/// Run a tunnel until it shuts down or `interrupt` resolves.
///
/// An interrupt is an orderly stop and yields `Ok(())`. Any other shutdown
/// cause is returned as the error.
pub async fn serve<L, S, F>(ctx: Arc<TunnelContext<L, S>>, interrupt: F) -> Result<(), TunnelError>
where
    L: Listener,
    S: Session,
    F: Future<Output = ()>,
{
    let acceptor = tokio::spawn(accept_loop(ctx.clone()));

    tokio::select! {
        _ = ctx.done() => {}
        _ = interrupt => {
            info!("interrupt received, closing tunnel");
            ctx.shutdown(TunnelError::Interrupted);
        }
        _ = ctx.session().closed() => {
            if !ctx.is_shutting_down() {
                warn!("relay session closed, closing tunnel");
            }
            ctx.shutdown(TunnelError::SessionClosed);
        }
    }

    // Whoever won the shutdown may still be tearing down.
    ctx.done().await;

    // The listener is closed by now, so the accept loop is on its way out.
    if let Err(e) = acceptor.await {
        warn!(error = %e, "accept loop task failed");
    }

    match ctx.take_cause() {
        None | Some(TunnelError::Interrupted) => Ok(()),
        Some(cause) => Err(cause),
    }
}

fn reachable_from_network(addr: SocketAddr) -> bool {
    !addr.ip().is_loopback()
}

/// A connected tunnel: transport dialed, session running, local port bound.
#[derive(Debug)]
pub struct Tunnel {
    ctx: Arc<TunnelContext<TcpAcceptor, mux::Session>>,
    local_addr: SocketAddr,
}

impl Tunnel {
    /// Do all the startup work. Failures here happen before any worker runs
    /// and are returned directly.
    pub async fn open(config: &TunnelConfig) -> Result<Self, TunnelError> {
        let metadata = StreamMetadata::for_port(&config.remote_port)?;
        config.mux.verify()?;

        let transport = transport::dial(&config.transport_url, &config.headers).await?;
        let session = mux::Session::client(transport, config.mux.clone())?;

        let addr = format!("{}:{}", config.bind_host, config.local_port);
        let listener = match TcpAcceptor::bind((config.bind_host.as_str(), config.local_port)).await {
            Ok(listener) => listener,
            Err(source) => {
                session.close();
                return Err(TunnelError::Bind { addr, source });
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(source) => {
                session.close();
                return Err(TunnelError::Bind { addr, source });
            }
        };

        if reachable_from_network(local_addr) {
            warn!(%local_addr, "listening beyond loopback, the forwarded port is reachable from other hosts");
        }
        info!(%local_addr, remote_port = %metadata.remote_port, "tunnel ready");
        Ok(Self {
            ctx: Arc::new(TunnelContext::new(listener, session, metadata)),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_port(&self) -> &str {
        &self.ctx.metadata().remote_port
    }

    pub async fn run<F>(self, interrupt: F) -> Result<(), TunnelError>
    where
        F: Future<Output = ()>,
    {
        serve(self.ctx, interrupt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_loopback_binds_stay_private() {
        assert!(!reachable_from_network("127.0.0.1:5000".parse().unwrap()));
        assert!(!reachable_from_network("[::1]:5000".parse().unwrap()));
        assert!(reachable_from_network("0.0.0.0:5000".parse().unwrap()));
        assert!(reachable_from_network("192.168.1.20:5000".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_acceptor_binds_ipv6_loopback_host() {
        let Ok(listener) = TcpAcceptor::bind(("::1", 0)).await else {
            return; // host without IPv6
        };
        assert!(!reachable_from_network(listener.local_addr().unwrap()));
    }

    #[tokio::test]
    async fn test_open_rejects_bad_port_before_dialing() {
        let config = TunnelConfig::new("ws://127.0.0.1:1/unreachable", 0, "not-a-port");
        assert!(matches!(
            Tunnel::open(&config).await,
            Err(TunnelError::InvalidPort(_))
        ));
    }
}
