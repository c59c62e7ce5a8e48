pub mod config;
pub mod tunnel;

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Forward a local port through the relay
    Tunnel(tunnel::Args),

    /// Show where settings are read from and what a profile resolves to
    Config(config::Args),
}
