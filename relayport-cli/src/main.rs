use anyhow::Result;
use clap::Parser;
use clap_verbosity_flag::Verbosity;

mod command;
mod config;
mod sys;

#[derive(Debug, clap::Parser)]
#[command(name = "relayport", version)]
#[command(about = "Forward a local TCP port to a remote host through a relay.", long_about = None)]
pub struct Cli {
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity,

    /// Profile to read relay settings from
    #[arg(long, default_value = "default", global = true)]
    profile: String,

    #[command(subcommand)]
    command: command::Command,
}

fn init_logger_env(verbosity: &Verbosity) {
    use tracing::level_filters::LevelFilter;

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::ERROR.into())
        .with_env_var("RELAYPORT_LOG")
        .from_env_lossy();

    tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(match (verbosity.is_present(), verbosity.is_silent()) {
            (false, _) => env_filter,
            (true, true) => env_filter.add_directive(LevelFilter::OFF.into()),
            (true, false) => {
                let level_filter = match verbosity.log_level_filter() {
                    clap_verbosity_flag::LevelFilter::Off => LevelFilter::OFF,
                    clap_verbosity_flag::LevelFilter::Error => LevelFilter::ERROR,
                    clap_verbosity_flag::LevelFilter::Warn => LevelFilter::WARN,
                    clap_verbosity_flag::LevelFilter::Info => LevelFilter::INFO,
                    clap_verbosity_flag::LevelFilter::Debug => LevelFilter::DEBUG,
                    clap_verbosity_flag::LevelFilter::Trace => LevelFilter::TRACE,
                };
                env_filter.add_directive(level_filter.into())
            }
        })
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger_env(&cli.verbose);

    match &cli.command {
        command::Command::Tunnel(args) => {
            command::tunnel::execute(args, &cli.profile).await?;
        }
        command::Command::Config(args) => {
            command::config::execute(args, &cli.profile)?;
        }
    }

    Ok(())
}
