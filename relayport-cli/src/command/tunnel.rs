//! Tunnel command - forwards a local port through the relay.

use anyhow::{bail, Context, Result};
use clap::Parser;
use relayport::config::DEFAULT_BIND_HOST;
use relayport::{Tunnel, TunnelConfig};
use tracing::warn;

use crate::config::{Config, ProfileConfig};

/// Forward a local TCP port to a remote port through the relay
#[derive(Debug, Parser)]
pub struct Args {
    /// Relay WebSocket URL (ws:// or wss://)
    #[arg(long, env = "RELAYPORT_URL")]
    url: Option<String>,

    /// Extra handshake header, e.g. 'Authorization: Bearer <token>'
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Local port to listen on (0 picks a free one)
    #[arg(short, long, env = "RELAYPORT_LOCAL_PORT")]
    local_port: u16,

    /// Port on the remote host to connect each stream to
    #[arg(short, long, env = "RELAYPORT_REMOTE_PORT")]
    remote_port: String,

    /// Local address to bind (default: 127.0.0.1)
    #[arg(long, env = "RELAYPORT_BIND_HOST")]
    bind_host: Option<String>,
}

pub(crate) fn parse_header(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("expected 'Name: Value', got '{raw}'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("header name is empty in '{raw}'");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl Args {
    /// Merge the flags with the selected profile. Flags win; profile headers
    /// are sent first.
    pub fn to_config(&self, profile: Option<&ProfileConfig>) -> Result<TunnelConfig> {
        let url = self
            .url
            .clone()
            .or_else(|| profile.and_then(|p| p.url.clone()))
            .context("No relay URL configured. Pass --url or set it in the profile.")?;

        let mut config = TunnelConfig::new(url, self.local_port, self.remote_port.trim());
        config.bind_host = self
            .bind_host
            .clone()
            .or_else(|| profile.and_then(|p| p.bind_host.clone()))
            .unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());

        if let Some(profile) = profile {
            for raw in &profile.headers {
                let (name, value) =
                    parse_header(raw).with_context(|| format!("Invalid header in profile: {raw}"))?;
                config = config.with_header(name, value);
            }
        }
        for (name, value) in &self.headers {
            config = config.with_header(name, value);
        }

        Ok(config)
    }
}

pub async fn execute(args: &Args, profile: &str) -> Result<()> {
    let config = Config::load()?;
    let tunnel_config = args.to_config(config.get_profile(profile))?;

    let tunnel = Tunnel::open(&tunnel_config)
        .await
        .context("Failed to start tunnel")?;

    println!("\n✓ Tunnel established!");
    println!("  Forwarding: {} -> remote port {}", tunnel.local_addr(), tunnel.remote_port());
    if !tunnel.local_addr().ip().is_loopback() {
        println!("  Warning: {} is not a loopback address; other hosts can reach this port.", tunnel.local_addr().ip());
    }
    println!("\nPress Ctrl+C to stop the tunnel.\n");

    let result = tunnel
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    match result {
        Ok(()) => {
            println!("Tunnel closed.");
            Ok(())
        }
        Err(e) => {
            println!("Tunnel stopped: {e}");
            Err(e).context("Tunnel failed")
        }
    }
}
